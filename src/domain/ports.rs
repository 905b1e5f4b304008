use crate::domain::model::{Listing, ListingId, ListingKind, Rank, SlotUpdate};
use crate::domain::slots::FeaturedRow;
use crate::utils::error::Result;
use async_trait::async_trait;

/// Reads and writes available inside one store transaction.
///
/// Everything done through one handle commits or rolls back together.
pub trait SlotTransaction {
    fn find_listing(&self, kind: ListingKind, id: ListingId) -> Result<Option<Listing>>;

    /// Featured listings of `kind`, ordered by rank, optionally without `exclude_id`.
    fn load_featured(
        &self,
        kind: ListingKind,
        exclude_id: Option<ListingId>,
    ) -> Result<Vec<FeaturedRow>>;

    /// The listing other than `exclude_id` that holds `rank`, if any.
    fn find_occupant(
        &self,
        kind: ListingKind,
        rank: Rank,
        exclude_id: Option<ListingId>,
    ) -> Result<Option<ListingId>>;

    fn apply_updates(&mut self, kind: ListingKind, updates: &[SlotUpdate]) -> Result<()>;

    /// Persist the non-slot fields of `listing`.
    fn save_listing(&mut self, listing: &Listing) -> Result<()>;

    /// Full collection of `kind`, featured first by rank, then the kind's default ordering.
    fn list_all(&self, kind: ListingKind) -> Result<Vec<Listing>>;
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Run `work` inside one transaction scoped to `kind`.
    ///
    /// Commits when `work` returns `Ok`, rolls back otherwise. Conflicts with
    /// concurrent writers surface as `SlotError::TransactionConflict`.
    async fn transaction<T, F>(&self, kind: ListingKind, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn SlotTransaction) -> Result<T> + Send + 'static;

    async fn list(&self, kind: ListingKind) -> Result<Vec<Listing>>;

    /// Insert a listing as-is. Used by the CRUD side and for seeding.
    async fn insert(&self, listing: Listing) -> Result<Listing>;
}
