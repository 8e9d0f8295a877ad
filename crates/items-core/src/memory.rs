use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::CoreError;
use crate::model::{Item, ItemId};
use crate::provision::{ProvisioningError, ResourceProvider};
use crate::store::ItemStore;
use crate::topology::KeySchema;

type Document = Map<String, Value>;

#[derive(Default)]
struct Inner {
    tables: DashMap<String, Arc<DashMap<String, Document>>>,
    unavailable: AtomicBool,
}

/// Process-local stand-in for the table backend.
///
/// Tables hold flat JSON documents, exactly what would be sent over the wire,
/// so reads hand back a fresh copy and never share state with the writer.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every table operation fails with
    /// [`CoreError::StorageUnavailable`] until switched back.
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.tables.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of items in `table`, or `None` if the table does not exist.
    pub fn item_count(&self, table: &str) -> Option<usize> {
        self.inner.tables.get(table).map(|t| t.len())
    }

    /// A store handle over `table`. The table is looked up on every call, so
    /// a handle outlives deletion and reports [`CoreError::TableMissing`].
    pub fn store(&self, table: impl Into<String>, primary_key: impl Into<String>) -> MemoryStore {
        MemoryStore {
            backend: self.clone(),
            table_name: table.into(),
            primary_key: primary_key.into(),
        }
    }

    fn table(&self, name: &str) -> Result<Arc<DashMap<String, Document>>, CoreError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(CoreError::StorageUnavailable(format!("table {name}: backend offline")));
        }
        self.inner
            .tables
            .get(name)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| CoreError::TableMissing(name.to_string()))
    }
}

/// [`ItemStore`] over one table of a [`MemoryBackend`].
#[derive(Clone)]
pub struct MemoryStore {
    backend: MemoryBackend,
    table_name: String,
    primary_key: String,
}

#[async_trait]
impl ItemStore for MemoryStore {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn get(&self, id: &ItemId) -> Result<Item, CoreError> {
        let table = self.backend.table(&self.table_name)?;
        let document = table
            .get(id.as_str())
            .map(|d| d.value().clone())
            .ok_or_else(|| CoreError::NotFound(format!("item {id}")))?;
        Ok(Item::from_document(&self.primary_key, document)?)
    }

    async fn put(&self, item: &Item) -> Result<(), CoreError> {
        let table = self.backend.table(&self.table_name)?;
        table.insert(item.id.to_string(), item.to_document(&self.primary_key));
        debug!(table = %self.table_name, item_id = %item.id, "item written");
        Ok(())
    }
}

#[async_trait]
impl ResourceProvider for MemoryBackend {
    async fn table_exists(&self, name: &str) -> Result<bool, ProvisioningError> {
        Ok(self.inner.tables.contains_key(name))
    }

    async fn create_table(&self, name: &str, key: &KeySchema) -> Result<(), ProvisioningError> {
        match self.inner.tables.entry(name.to_string()) {
            Entry::Occupied(_) => {
                Err(ProvisioningError::DuplicateResource(format!("table {name}")))
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(DashMap::new()));
                info!(table = name, partition_key = %key.name, "memory table created");
                Ok(())
            }
        }
    }

    async fn delete_table(&self, name: &str) -> Result<(), ProvisioningError> {
        if self.inner.tables.remove(name).is_some() {
            info!(table = name, "memory table deleted");
        }
        Ok(())
    }

    fn open_table(&self, name: &str, primary_key: &str) -> Arc<dyn ItemStore> {
        Arc::new(self.store(name, primary_key))
    }
}
