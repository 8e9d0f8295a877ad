use async_trait::async_trait;

use crate::error::CoreError;
use crate::model::{Item, ItemId};

/// Point reads and writes over a single items table, keyed by `itemId`.
///
/// Every call is a direct round trip to the backing store; implementations
/// keep no cache.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Physical name of the table this store talks to.
    fn table_name(&self) -> &str;

    /// Fetch the item stored under `id`, or [`CoreError::NotFound`].
    async fn get(&self, id: &ItemId) -> Result<Item, CoreError>;

    /// Insert `item`, overwriting any item with the same id.
    async fn put(&self, item: &Item) -> Result<(), CoreError>;
}
