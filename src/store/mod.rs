//! Catalog persistence
//!
//! The crawler and commands talk to [`CatalogStore`]; the JSON file store is
//! the only implementation shipped.

mod database;
mod json_store;

pub use database::Database;
pub use json_store::{DatabaseStore, write_json_atomic};

use crate::error::StoreResult;

/// Load/save of the whole catalog. A failed save leaves the previous
/// document intact.
#[allow(async_fn_in_trait)]
pub trait CatalogStore {
    async fn load(&self) -> StoreResult<Database>;
    async fn save(&self, db: &Database) -> StoreResult<()>;
}
