pub mod featured;

pub use crate::domain::allocator::{Allocation, SlotAllocator, SlotOperation};
pub use crate::domain::model::{
    Featurable, Listing, ListingId, ListingKind, ListingPatch, Rank, SlotState, SlotUpdate,
    MAX_FEATURED,
};
pub use crate::domain::ports::{ListingStore, SlotTransaction};
pub use crate::domain::slots::{FeaturedRow, SlotEntry, SlotSet};
pub use crate::utils::error::Result;
pub use featured::{FeaturedOutcome, FeaturedService};
