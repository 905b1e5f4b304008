use crate::config::RetryPolicy;
use crate::domain::allocator::{SlotAllocator, SlotOperation};
use crate::domain::model::{Featurable, Listing, ListingId, ListingKind, ListingPatch, Rank};
use crate::domain::ports::{ListingStore, SlotTransaction};
use crate::domain::slots::SlotSet;
use crate::utils::error::{Result, SlotError};
use chrono::Utc;
use serde::Serialize;
use tracing::Instrument;

/// The updated listing plus the whole collection of its kind.
///
/// Clients need the collection because the ranks of other listings may have
/// changed as a side effect.
#[derive(Debug, Clone, Serialize)]
pub struct FeaturedOutcome {
    pub kind: ListingKind,
    pub listing: Listing,
    pub all: Vec<Listing>,
    /// Whether the defensive reorder fallback ran.
    #[serde(skip)]
    pub used_fallback: bool,
}

impl FeaturedOutcome {
    /// Response body in the shape the admin UI expects, e.g.
    /// `{ "project": {...}, "allProjects": [...] }`.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut body = serde_json::Map::new();
        body.insert(
            self.kind.entity_name().to_string(),
            serde_json::to_value(&self.listing)?,
        );
        body.insert(
            self.kind.collection_name().to_string(),
            serde_json::to_value(&self.all)?,
        );
        Ok(serde_json::Value::Object(body))
    }
}

/// Decide which slot operation a patch asks for, given the listing's current state.
///
/// Returns `None` when the patch leaves the featured state alone. The requested
/// rank is only validated when the listing stays or becomes featured; a release
/// never fails on it.
pub fn resolve_operation<T: Featurable>(
    current: &T,
    patch: &ListingPatch,
) -> Result<Option<SlotOperation>> {
    let published = patch.published.unwrap_or(current.is_published());
    // Unpublished listings cannot stay featured.
    let wants_featured = published && patch.featured.unwrap_or(current.is_featured());

    let operation = match (current.is_featured(), wants_featured) {
        (false, true) => Some(SlotOperation::Activate {
            requested: patch.requested_rank()?,
        }),
        (true, true) => patch
            .requested_rank()?
            .map(|new_rank| SlotOperation::Reorder { new_rank }),
        (true, false) => Some(SlotOperation::Release),
        (false, false) if patch.featured == Some(true) && patch.published.is_none() => {
            return Err(SlotError::NotPublished {
                id: current.listing_id(),
            })
        }
        (false, false) if patch.featured.is_some() || patch.published.is_some() => {
            Some(SlotOperation::Release)
        }
        (false, false) => None,
    };
    Ok(operation)
}

pub struct FeaturedService<S: ListingStore> {
    store: S,
    retry: RetryPolicy,
}

impl<S: ListingStore> FeaturedService<S> {
    pub fn new(store: S) -> Self {
        Self::with_retry_policy(store, RetryPolicy::default())
    }

    pub fn with_retry_policy(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply a partial update to a listing, moving featured slots as needed,
    /// in one transaction. Conflicts with concurrent writers are retried with
    /// fresh reads.
    pub async fn apply(
        &self,
        kind: ListingKind,
        id: ListingId,
        patch: ListingPatch,
    ) -> Result<FeaturedOutcome> {
        let span = tracing::info_span!(
            "featured_apply",
            kind = %kind,
            listing_id = id,
            op = tracing::field::Empty
        );
        self.apply_with_retry(kind, id, patch).instrument(span).await
    }

    /// Stop featuring a listing. Releasing a listing that is not featured is a no-op.
    pub async fn release(&self, kind: ListingKind, id: ListingId) -> Result<FeaturedOutcome> {
        self.apply(kind, id, ListingPatch::featured(false)).await
    }

    /// Unpublish a listing, releasing its featured slot in the same transaction.
    pub async fn unpublish(&self, kind: ListingKind, id: ListingId) -> Result<FeaturedOutcome> {
        let patch = ListingPatch {
            published: Some(false),
            ..ListingPatch::default()
        };
        self.apply(kind, id, patch).await
    }

    pub async fn collection(&self, kind: ListingKind) -> Result<Vec<Listing>> {
        self.store.list(kind).await
    }

    async fn apply_with_retry(
        &self,
        kind: ListingKind,
        id: ListingId,
        patch: ListingPatch,
    ) -> Result<FeaturedOutcome> {
        let mut attempt = 0;
        loop {
            let patch = patch.clone();
            // The store may run the closure on another thread.
            let span = tracing::Span::current();
            let result = self
                .store
                .transaction(kind, move |tx| {
                    let _entered = span.enter();
                    apply_in_transaction(tx, &span, kind, id, &patch)
                })
                .await;

            match result {
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Slot transaction conflicted, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    match e.status_code() {
                        500 => tracing::error!(error = %e, "Featured update failed"),
                        _ => tracing::info!(error = %e, "Featured update rejected"),
                    }
                    return Err(e);
                }
                Ok(outcome) => return Ok(outcome),
            }
        }
    }
}

/// Load, compute and persist one featured change. Runs inside a store transaction.
fn apply_in_transaction(
    tx: &mut dyn SlotTransaction,
    span: &tracing::Span,
    kind: ListingKind,
    id: ListingId,
    patch: &ListingPatch,
) -> Result<FeaturedOutcome> {
    let mut listing = tx
        .find_listing(kind, id)?
        .ok_or(SlotError::NotFound { kind, id })?;

    let mut used_fallback = false;
    if let Some(operation) = resolve_operation(&listing, patch)? {
        span.record("op", operation.name());
        let others = SlotSet::from_rows(tx.load_featured(kind, Some(id))?);
        let allocation = SlotAllocator::compute(&others, &listing, operation)?;

        if allocation.is_noop_for(&listing) {
            tracing::debug!(op = operation.name(), "Featured state unchanged");
        } else {
            tx.apply_updates(kind, &allocation.updates(id))?;
            for update in &allocation.displaced {
                match update.rank {
                    Some(rank) => {
                        tracing::info!(listing_id = update.id, rank = %rank, "Shifted featured listing")
                    }
                    None => tracing::info!(listing_id = update.id, "Evicted featured listing"),
                }
            }
            tracing::info!(
                op = operation.name(),
                rank = ?allocation.target.rank.map(|r: Rank| r.get()),
                displaced = allocation.displaced.len(),
                fallback = allocation.used_fallback,
                "Applied featured change"
            );
        }
        used_fallback = allocation.used_fallback;
        listing.set_slot(allocation.target);

        if let Some(rank) = listing.rank() {
            if let Some(holder) = tx.find_occupant(kind, rank, Some(id))? {
                return Err(SlotError::InvariantViolation {
                    message: format!("rank {} of {} {} is also held by {}", rank, kind, id, holder),
                });
            }
        }
    } else if listing.is_featured() && listing.rank().is_none() {
        tracing::warn!("Invariant violation: featured listing has no rank and no rank was requested");
    }

    patch.apply_fields(&mut listing);
    listing.updated_at = Utc::now();
    tx.save_listing(&listing)?;

    let all = tx.list_all(kind)?;
    Ok(FeaturedOutcome {
        kind,
        listing,
        all,
        used_fallback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::SlotState;

    fn rank(value: i64) -> Rank {
        Rank::new(value).unwrap()
    }

    fn listing(featured_at: Option<i64>) -> Listing {
        let mut listing = Listing::new(1, ListingKind::Project, "Kule");
        if let Some(at) = featured_at {
            listing.set_slot(SlotState::featured_at(rank(at)));
        }
        listing
    }

    #[test]
    fn test_resolve_activation() {
        let op = resolve_operation(&listing(None), &ListingPatch::featured(true)).unwrap();
        assert_eq!(op, Some(SlotOperation::Activate { requested: None }));

        let op = resolve_operation(&listing(None), &ListingPatch::featured(true).with_order(2))
            .unwrap();
        assert_eq!(
            op,
            Some(SlotOperation::Activate {
                requested: Some(rank(2))
            })
        );
    }

    #[test]
    fn test_resolve_reorder_needs_order() {
        let patch = ListingPatch {
            featured_order: Some(3),
            ..ListingPatch::default()
        };
        assert_eq!(
            resolve_operation(&listing(Some(1)), &patch).unwrap(),
            Some(SlotOperation::Reorder { new_rank: rank(3) })
        );
        assert_eq!(
            resolve_operation(&listing(Some(1)), &ListingPatch::featured(true)).unwrap(),
            None
        );
    }

    #[test]
    fn test_resolve_release() {
        assert_eq!(
            resolve_operation(&listing(Some(2)), &ListingPatch::featured(false)).unwrap(),
            Some(SlotOperation::Release)
        );
        assert_eq!(
            resolve_operation(&listing(None), &ListingPatch::featured(false)).unwrap(),
            Some(SlotOperation::Release)
        );
    }

    #[test]
    fn test_unpublish_forces_release() {
        let patch = ListingPatch {
            published: Some(false),
            featured: Some(true),
            ..ListingPatch::default()
        };
        assert_eq!(
            resolve_operation(&listing(Some(1)), &patch).unwrap(),
            Some(SlotOperation::Release)
        );
    }

    #[test]
    fn test_unrelated_patch_leaves_slots_alone() {
        let patch = ListingPatch {
            title: Some("Yeni".to_string()),
            ..ListingPatch::default()
        };
        assert_eq!(resolve_operation(&listing(None), &patch).unwrap(), None);
        assert_eq!(resolve_operation(&listing(Some(1)), &patch).unwrap(), None);
    }

    #[test]
    fn test_invalid_order_is_rejected() {
        let err = resolve_operation(&listing(None), &ListingPatch::featured(true).with_order(4))
            .unwrap_err();
        assert!(matches!(err, SlotError::InvalidRank { value: 4 }));
    }

    #[test]
    fn test_release_ignores_invalid_order() {
        let patch = ListingPatch::featured(false).with_order(0);
        assert_eq!(
            resolve_operation(&listing(Some(2)), &patch).unwrap(),
            Some(SlotOperation::Release)
        );

        let patch = ListingPatch {
            published: Some(false),
            featured_order: Some(9),
            ..ListingPatch::default()
        };
        assert_eq!(
            resolve_operation(&listing(Some(2)), &patch).unwrap(),
            Some(SlotOperation::Release)
        );
    }

    #[test]
    fn test_unpublish_wins_over_featuring() {
        let patch = ListingPatch {
            published: Some(false),
            featured: Some(true),
            ..ListingPatch::default()
        };
        assert_eq!(
            resolve_operation(&listing(None), &patch).unwrap(),
            Some(SlotOperation::Release)
        );
    }

    #[test]
    fn test_unpublished_listing_cannot_be_activated() {
        let mut draft = listing(None);
        draft.published = false;

        let err = resolve_operation(&draft, &ListingPatch::featured(true)).unwrap_err();
        assert!(matches!(err, SlotError::NotPublished { id: 1 }));

        // Publishing in the same patch is fine.
        let patch = ListingPatch {
            published: Some(true),
            featured: Some(true),
            ..ListingPatch::default()
        };
        assert_eq!(
            resolve_operation(&draft, &patch).unwrap(),
            Some(SlotOperation::Activate { requested: None })
        );
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = FeaturedOutcome {
            kind: ListingKind::Property,
            listing: Listing::new(5, ListingKind::Property, "Daire"),
            all: vec![Listing::new(5, ListingKind::Property, "Daire")],
            used_fallback: false,
        };
        let json = outcome.to_json().unwrap();
        assert_eq!(json["property"]["id"], 5);
        assert_eq!(json["allProperties"].as_array().unwrap().len(), 1);
    }
}
