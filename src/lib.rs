pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliConfig;

pub use crate::adapters::{create_router, run_server, SqliteListingStore};
pub use crate::config::{RetryPolicy, TomlConfig};
pub use crate::core::{
    FeaturedOutcome, FeaturedService, Listing, ListingKind, ListingPatch, Rank, SlotAllocator,
    SlotOperation, SlotSet,
};
pub use crate::utils::error::{Result, SlotError};
