use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CoreError;
use crate::model::{Item, ItemId};
use crate::store::ItemStore;

/// A single operation class a function may be authorized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Read => f.write_str("read"),
            Capability::Write => f.write_str("write"),
        }
    }
}

/// Access level as declared in a topology grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Access::Read => &[Capability::Read],
            Access::Write => &[Capability::Write],
            Access::ReadWrite => &[Capability::Read, Capability::Write],
        }
    }
}

/// One resolved authorization edge: `function` may perform `capability` on
/// `table` (physical name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantEdge {
    pub function: String,
    pub table: String,
    pub capability: Capability,
}

impl fmt::Display for GrantEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.function, self.capability, self.table)
    }
}

/// Capabilities held by `function` on `table` within an edge set.
pub fn capabilities_for(
    edges: &BTreeSet<GrantEdge>,
    function: &str,
    table: &str,
) -> BTreeSet<Capability> {
    edges
        .iter()
        .filter(|e| e.function == function && e.table == table)
        .map(|e| e.capability)
        .collect()
}

/// An [`ItemStore`] limited to the capabilities one function was granted.
///
/// The capability set is fixed when the function is deployed; calls outside
/// it fail with [`CoreError::AccessDenied`] without reaching the backend.
pub struct ScopedStore {
    inner: Arc<dyn ItemStore>,
    principal: String,
    capabilities: BTreeSet<Capability>,
}

impl ScopedStore {
    pub fn new(
        inner: Arc<dyn ItemStore>,
        principal: impl Into<String>,
        capabilities: BTreeSet<Capability>,
    ) -> Self {
        Self {
            inner,
            principal: principal.into(),
            capabilities,
        }
    }

    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    fn require(&self, capability: Capability) -> Result<(), CoreError> {
        if self.capabilities.contains(&capability) {
            return Ok(());
        }
        warn!(
            principal = %self.principal,
            table = %self.inner.table_name(),
            %capability,
            "storage access without grant"
        );
        Err(CoreError::AccessDenied(format!(
            "{} has no {capability} grant on table {}",
            self.principal,
            self.inner.table_name()
        )))
    }
}

#[async_trait]
impl ItemStore for ScopedStore {
    fn table_name(&self) -> &str {
        self.inner.table_name()
    }

    async fn get(&self, id: &ItemId) -> Result<Item, CoreError> {
        self.require(Capability::Read)?;
        self.inner.get(id).await
    }

    async fn put(&self, item: &Item) -> Result<(), CoreError> {
        self.require(Capability::Write)?;
        self.inner.put(item).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::provision::ResourceProvider;
    use crate::topology::KeySchema;

    fn edge(function: &str, capability: Capability) -> GrantEdge {
        GrantEdge {
            function: function.into(),
            table: "items".into(),
            capability,
        }
    }

    #[test]
    fn read_write_expands_to_both() {
        assert_eq!(
            Access::ReadWrite.capabilities(),
            &[Capability::Read, Capability::Write]
        );
    }

    #[test]
    fn capabilities_are_scoped_per_function() {
        let edges = BTreeSet::from([
            edge("getOne", Capability::Read),
            edge("createOne", Capability::Write),
        ]);
        assert_eq!(
            capabilities_for(&edges, "getOne", "items"),
            BTreeSet::from([Capability::Read])
        );
        assert!(capabilities_for(&edges, "getOne", "other").is_empty());
    }

    #[tokio::test]
    async fn denies_without_grant() {
        let backend = MemoryBackend::new();
        backend
            .create_table("items", &KeySchema::string("itemId"))
            .await
            .unwrap();
        let store = ScopedStore::new(
            backend.open_table("items", "itemId"),
            "getOne",
            BTreeSet::from([Capability::Read]),
        );

        let item = Item::new(ItemId::new("abc").unwrap());
        let err = store.put(&item).await.unwrap_err();
        assert!(matches!(err, CoreError::AccessDenied(_)));
        assert_eq!(backend.item_count("items"), Some(0));

        // A read is authorized and reaches the table.
        let err = store.get(&item.id).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
