// Adapters layer: concrete implementations for external systems (storage, http).

pub mod http;
pub mod sqlite;

pub use http::{create_router, run_server};
pub use sqlite::SqliteListingStore;
