//! Featured slot allocation - computes slot changes, no I/O.
//!
//! Every operation takes the set of *other* featured listings and the target
//! listing, and returns the target's new state plus the updates that other
//! listings need. Nothing is written here; the caller persists the result
//! atomically.

use crate::domain::model::{Featurable, ListingId, Rank, SlotState, SlotUpdate, MAX_FEATURED};
use crate::domain::slots::SlotSet;
use crate::utils::error::{Result, SlotError};
use serde::{Deserialize, Serialize};

/// A requested change to a listing's featured state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum SlotOperation {
    /// Feature a listing that is not featured yet.
    Activate { requested: Option<Rank> },
    /// Move an already featured listing to another rank.
    Reorder { new_rank: Rank },
    /// Stop featuring a listing.
    Release,
}

impl SlotOperation {
    pub fn name(&self) -> &'static str {
        match self {
            SlotOperation::Activate { .. } => "activate",
            SlotOperation::Reorder { .. } => "reorder",
            SlotOperation::Release => "release",
        }
    }
}

/// Result of one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Allocation {
    pub target: SlotState,
    /// Updates for other listings: shifted ranks or evictions.
    pub displaced: Vec<SlotUpdate>,
    /// Set when the defensive shift fallback of `Reorder` had to run.
    pub used_fallback: bool,
}

impl Allocation {
    fn unchanged<T: Featurable>(target: &T) -> Self {
        Self {
            target: target.slot_state(),
            ..Self::default()
        }
    }

    /// Whether applying this allocation changes nothing.
    pub fn is_noop_for<T: Featurable>(&self, target: &T) -> bool {
        self.displaced.is_empty() && self.target == target.slot_state()
    }

    pub fn evicted(&self) -> impl Iterator<Item = ListingId> + '_ {
        self.displaced
            .iter()
            .filter(|update| update.is_eviction())
            .map(|update| update.id)
    }

    /// All writes for this allocation, target first.
    pub fn updates(&self, target_id: ListingId) -> Vec<SlotUpdate> {
        let mut updates = Vec::with_capacity(self.displaced.len() + 1);
        updates.push(SlotUpdate::new(target_id, self.target));
        updates.extend(self.displaced.iter().copied());
        updates
    }
}

pub struct SlotAllocator;

impl SlotAllocator {
    /// Compute the effect of `operation` on `target` given the other occupants.
    ///
    /// `others` must not contain the target, ranked or not.
    pub fn compute<T: Featurable>(
        others: &SlotSet,
        target: &T,
        operation: SlotOperation,
    ) -> Result<Allocation> {
        if others.contains(target.listing_id()) {
            return Err(SlotError::InvariantViolation {
                message: format!(
                    "listing {} is both the target and one of the other occupants",
                    target.listing_id()
                ),
            });
        }

        match operation {
            SlotOperation::Activate { requested } => Self::activate(others, target, requested),
            SlotOperation::Reorder { new_rank } => Self::reorder(others, target, new_rank),
            SlotOperation::Release => Ok(Self::release()),
        }
    }

    fn activate<T: Featurable>(
        others: &SlotSet,
        target: &T,
        requested: Option<Rank>,
    ) -> Result<Allocation> {
        if target.is_featured() {
            return Err(SlotError::AlreadyFeatured {
                id: target.listing_id(),
            });
        }
        // Capacity is counted over all other occupants, whatever rank is asked for.
        if others.len() >= MAX_FEATURED {
            return Err(SlotError::CapacityExceeded {
                capacity: MAX_FEATURED,
            });
        }

        let rank = match requested {
            Some(rank) => rank,
            None => others
                .lowest_free_rank()
                .ok_or(SlotError::CapacityExceeded {
                    capacity: MAX_FEATURED,
                })?,
        };

        let displaced = if others.occupant_of(rank).is_some() {
            Self::shift_from(others, rank)
        } else {
            Vec::new()
        };

        Ok(Allocation {
            target: SlotState::featured_at(rank),
            displaced,
            used_fallback: false,
        })
    }

    fn reorder<T: Featurable>(others: &SlotSet, target: &T, new_rank: Rank) -> Result<Allocation> {
        if !target.is_featured() {
            return Err(SlotError::NotFeatured {
                id: target.listing_id(),
            });
        }
        if target.rank() == Some(new_rank) {
            return Ok(Allocation::unchanged(target));
        }

        let occupant = match others.occupant_of(new_rank) {
            Some(occupant) => occupant,
            None => {
                return Ok(Allocation {
                    target: SlotState::featured_at(new_rank),
                    ..Allocation::default()
                })
            }
        };

        match target.rank() {
            Some(old_rank) => Ok(Allocation {
                target: SlotState::featured_at(new_rank),
                displaced: vec![SlotUpdate::new(occupant, SlotState::featured_at(old_rank))],
                used_fallback: false,
            }),
            None => {
                tracing::warn!(
                    listing_id = target.listing_id(),
                    new_rank = %new_rank,
                    "Invariant violation: reordering a featured listing without a rank, shifting occupants"
                );
                Ok(Allocation {
                    target: SlotState::featured_at(new_rank),
                    displaced: Self::shift_from(others, new_rank),
                    used_fallback: true,
                })
            }
        }
    }

    fn release() -> Allocation {
        Allocation {
            target: SlotState::released(),
            ..Allocation::default()
        }
    }

    /// Push every occupant at or below `from` one rank down, highest first,
    /// evicting whoever falls past the last rank.
    fn shift_from(others: &SlotSet, from: Rank) -> Vec<SlotUpdate> {
        others
            .occupants_from_descending(from)
            .into_iter()
            .map(|entry| match entry.rank.next() {
                Some(next) => SlotUpdate::new(entry.id, SlotState::featured_at(next)),
                None => SlotUpdate::new(entry.id, SlotState::released()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Listing, ListingKind};
    use crate::domain::slots::FeaturedRow;

    fn rank(value: i64) -> Rank {
        Rank::new(value).unwrap()
    }

    fn listing(id: ListingId) -> Listing {
        Listing::new(id, ListingKind::Project, format!("listing {id}"))
    }

    fn featured(id: ListingId, at: i64) -> Listing {
        let mut listing = listing(id);
        listing.set_slot(SlotState::featured_at(rank(at)));
        listing
    }

    fn find(allocation: &Allocation, id: ListingId) -> Option<SlotUpdate> {
        allocation.displaced.iter().copied().find(|u| u.id == id)
    }

    const A: ListingId = 1;
    const B: ListingId = 2;
    const C: ListingId = 3;
    const D: ListingId = 4;

    #[test]
    fn test_target_among_others_is_rejected() {
        let others = SlotSet::from_entries([(A, rank(2)), (B, rank(1))]);
        let err = SlotAllocator::compute(&others, &listing(A), SlotOperation::Release).unwrap_err();
        assert!(matches!(err, SlotError::InvariantViolation { .. }));

        let others = SlotSet::from_rows([FeaturedRow::new(A, None), FeaturedRow::new(B, Some(1))]);
        let err = SlotAllocator::compute(
            &others,
            &listing(A),
            SlotOperation::Activate { requested: None },
        )
        .unwrap_err();
        assert!(matches!(err, SlotError::InvariantViolation { .. }));
    }

    #[test]
    fn test_activate_on_empty_set_takes_first_rank() {
        let result = SlotAllocator::compute(
            &SlotSet::new(),
            &listing(A),
            SlotOperation::Activate { requested: None },
        )
        .unwrap();

        assert_eq!(result.target, SlotState::featured_at(rank(1)));
        assert!(result.displaced.is_empty());
    }

    #[test]
    fn test_activate_takes_lowest_free_rank() {
        let others = SlotSet::from_entries([(A, rank(1)), (B, rank(2))]);
        let result =
            SlotAllocator::compute(&others, &listing(C), SlotOperation::Activate { requested: None })
                .unwrap();

        assert_eq!(result.target.rank, Some(rank(3)));
        assert!(result.displaced.is_empty());
    }

    #[test]
    fn test_activate_fills_gap_before_later_ranks() {
        let others = SlotSet::from_entries([(A, rank(1)), (B, rank(3))]);
        let result =
            SlotAllocator::compute(&others, &listing(C), SlotOperation::Activate { requested: None })
                .unwrap();

        assert_eq!(result.target.rank, Some(rank(2)));
        assert!(result.displaced.is_empty());
    }

    #[test]
    fn test_activate_rejects_when_full() {
        let others = SlotSet::from_entries([(A, rank(1)), (B, rank(2)), (C, rank(3))]);
        for requested in [None, Some(rank(1)), Some(rank(3))] {
            let err = SlotAllocator::compute(&others, &listing(D), SlotOperation::Activate { requested })
                .unwrap_err();
            assert!(matches!(err, SlotError::CapacityExceeded { capacity: 3 }));
        }
    }

    #[test]
    fn test_activate_counts_unranked_occupants_toward_capacity() {
        let others = SlotSet::from_rows([
            FeaturedRow::new(A, Some(1)),
            FeaturedRow::new(B, Some(2)),
            FeaturedRow::new(C, None),
        ]);
        let err =
            SlotAllocator::compute(&others, &listing(D), SlotOperation::Activate { requested: None })
                .unwrap_err();
        assert!(matches!(err, SlotError::CapacityExceeded { .. }));
    }

    #[test]
    fn test_activate_at_first_rank_shifts_everyone() {
        let others = SlotSet::from_entries([(A, rank(1)), (B, rank(2))]);
        let result = SlotAllocator::compute(
            &others,
            &listing(C),
            SlotOperation::Activate {
                requested: Some(rank(1)),
            },
        )
        .unwrap();

        assert_eq!(result.target, SlotState::featured_at(rank(1)));
        // Highest rank moves first so shifted occupants never collide.
        assert_eq!(result.displaced[0].id, B);
        assert_eq!(result.displaced[0].rank, Some(rank(3)));
        assert_eq!(result.displaced[1].id, A);
        assert_eq!(result.displaced[1].rank, Some(rank(2)));
        assert_eq!(result.evicted().count(), 0);
    }

    #[test]
    fn test_activate_at_middle_rank_leaves_lower_ranks() {
        let others = SlotSet::from_entries([(A, rank(1)), (B, rank(2))]);
        let result = SlotAllocator::compute(
            &others,
            &listing(C),
            SlotOperation::Activate {
                requested: Some(rank(2)),
            },
        )
        .unwrap();

        assert_eq!(result.target.rank, Some(rank(2)));
        assert_eq!(find(&result, B).unwrap().rank, Some(rank(3)));
        assert!(find(&result, A).is_none());
    }

    #[test]
    fn test_activate_at_free_rank_does_not_shift() {
        let others = SlotSet::from_entries([(A, rank(1))]);
        let result = SlotAllocator::compute(
            &others,
            &listing(C),
            SlotOperation::Activate {
                requested: Some(rank(3)),
            },
        )
        .unwrap();

        assert_eq!(result.target.rank, Some(rank(3)));
        assert!(result.displaced.is_empty());
    }

    #[test]
    fn test_activate_shift_evicts_past_last_rank() {
        let others = SlotSet::from_entries([(A, rank(2)), (B, rank(3))]);
        let result = SlotAllocator::compute(
            &others,
            &listing(C),
            SlotOperation::Activate {
                requested: Some(rank(2)),
            },
        )
        .unwrap();

        assert_eq!(result.target.rank, Some(rank(2)));
        let evicted = find(&result, B).unwrap();
        assert!(!evicted.featured);
        assert_eq!(evicted.rank, None);
        assert_eq!(find(&result, A).unwrap().rank, Some(rank(3)));
        assert_eq!(result.evicted().collect::<Vec<_>>(), vec![B]);
    }

    #[test]
    fn test_activate_already_featured_is_rejected() {
        let err = SlotAllocator::compute(
            &SlotSet::new(),
            &featured(A, 1),
            SlotOperation::Activate { requested: None },
        )
        .unwrap_err();
        assert!(matches!(err, SlotError::AlreadyFeatured { id: A }));
    }

    #[test]
    fn test_reorder_swaps_with_occupant() {
        let others = SlotSet::from_entries([(B, rank(2)), (C, rank(3))]);
        let result = SlotAllocator::compute(
            &others,
            &featured(A, 1),
            SlotOperation::Reorder { new_rank: rank(3) },
        )
        .unwrap();

        assert_eq!(result.target.rank, Some(rank(3)));
        assert_eq!(
            result.displaced,
            vec![SlotUpdate::new(C, SlotState::featured_at(rank(1)))]
        );
        assert!(!result.used_fallback);
    }

    #[test]
    fn test_reorder_to_own_rank_is_noop() {
        let target = featured(A, 2);
        let others = SlotSet::from_entries([(B, rank(1)), (C, rank(3))]);
        let result =
            SlotAllocator::compute(&others, &target, SlotOperation::Reorder { new_rank: rank(2) })
                .unwrap();

        assert!(result.is_noop_for(&target));
    }

    #[test]
    fn test_reorder_to_free_rank_moves_only_target() {
        let others = SlotSet::from_entries([(B, rank(2))]);
        let result = SlotAllocator::compute(
            &others,
            &featured(A, 1),
            SlotOperation::Reorder { new_rank: rank(3) },
        )
        .unwrap();

        assert_eq!(result.target.rank, Some(rank(3)));
        assert!(result.displaced.is_empty());
    }

    #[test]
    fn test_reorder_without_rank_falls_back_to_shift() {
        let mut target = listing(A);
        target.set_slot(SlotState {
            featured: true,
            rank: None,
        });
        let others = SlotSet::from_entries([(B, rank(2)), (C, rank(3))]);
        let result =
            SlotAllocator::compute(&others, &target, SlotOperation::Reorder { new_rank: rank(2) })
                .unwrap();

        assert!(result.used_fallback);
        assert_eq!(result.target.rank, Some(rank(2)));
        assert_eq!(find(&result, C).unwrap(), SlotUpdate::new(C, SlotState::released()));
        assert_eq!(find(&result, B).unwrap().rank, Some(rank(3)));
    }

    #[test]
    fn test_reorder_of_unfeatured_listing_is_rejected() {
        let err = SlotAllocator::compute(
            &SlotSet::new(),
            &listing(A),
            SlotOperation::Reorder { new_rank: rank(1) },
        )
        .unwrap_err();
        assert!(matches!(err, SlotError::NotFeatured { id: A }));
    }

    #[test]
    fn test_release_clears_only_target() {
        let others = SlotSet::from_entries([(B, rank(2))]);
        let result =
            SlotAllocator::compute(&others, &featured(A, 1), SlotOperation::Release).unwrap();

        assert_eq!(result.target, SlotState::released());
        assert!(result.displaced.is_empty());
    }

    #[test]
    fn test_release_is_idempotent() {
        let target = listing(A);
        let result =
            SlotAllocator::compute(&SlotSet::new(), &target, SlotOperation::Release).unwrap();
        assert!(result.is_noop_for(&target));
    }

    #[test]
    fn test_release_then_activate_reuses_rank() {
        let mut a = featured(A, 1);
        let released = SlotAllocator::compute(&SlotSet::new(), &a, SlotOperation::Release).unwrap();
        a.set_slot(released.target);

        let result =
            SlotAllocator::compute(&SlotSet::new(), &listing(B), SlotOperation::Activate { requested: None })
                .unwrap();
        assert_eq!(result.target.rank, Some(rank(1)));
    }

    #[test]
    fn test_updates_put_target_first() {
        let others = SlotSet::from_entries([(A, rank(1))]);
        let result = SlotAllocator::compute(
            &others,
            &listing(B),
            SlotOperation::Activate {
                requested: Some(rank(1)),
            },
        )
        .unwrap();

        let updates = result.updates(B);
        assert_eq!(updates[0], SlotUpdate::new(B, SlotState::featured_at(rank(1))));
        assert_eq!(updates[1], SlotUpdate::new(A, SlotState::featured_at(rank(2))));
    }
}
