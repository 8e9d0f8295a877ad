//! Provisioning engine: turns a [`Topology`] into a [`Deployment`].
//!
//! Applying is idempotent. The engine resolves the description into the
//! desired deployment, diffs it against the previous one, materializes the
//! table, and checks every function can reach the table it is bound to.
//! Tables created by a failed attempt are deleted again before the error is
//! returned.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::access::{GrantEdge, ScopedStore, capabilities_for};
use crate::config::{ConfigError, ENV_PRIMARY_KEY, FunctionConfig};
use crate::function::{ComputeFunction, instantiate};
use crate::store::ItemStore;
use crate::topology::{
    EntryPoint, EnvValue, KeySchema, RemovalPolicy, RouteSpec, Runtime, Topology, TopologyError,
};

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("invalid topology: {0}")]
    InvalidTopology(#[from] TopologyError),

    #[error("resource already exists: {0}")]
    DuplicateResource(String),

    #[error("refusing to replace table {table}: {reason}")]
    ReplacementRefused { table: String, reason: String },

    #[error("invalid environment for function {function}: {source}")]
    Environment {
        function: String,
        #[source]
        source: ConfigError,
    },

    #[error("function {function} is bound to table {table}, which does not exist")]
    DanglingTable { function: String, table: String },

    #[error("provider error: {0}")]
    Backend(String),

    #[error("{source} (rollback failed, left behind: {})", leftover.join(", "))]
    Partial {
        #[source]
        source: Box<ProvisioningError>,
        leftover: Vec<String>,
    },
}

/// Backend that owns the lifecycle of tables.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn table_exists(&self, name: &str) -> Result<bool, ProvisioningError>;

    /// Create a table. Fails with [`ProvisioningError::DuplicateResource`]
    /// if the name is taken.
    async fn create_table(&self, name: &str, key: &KeySchema) -> Result<(), ProvisioningError>;

    /// Delete a table and its data. Deleting a missing table succeeds.
    async fn delete_table(&self, name: &str) -> Result<(), ProvisioningError>;

    /// Data-plane handle for an existing table.
    fn open_table(&self, name: &str, primary_key: &str) -> Arc<dyn ItemStore>;
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedTable {
    pub id: String,
    pub physical_name: String,
    pub partition_key: KeySchema,
    pub removal_policy: RemovalPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedFunction {
    pub id: String,
    pub runtime: Runtime,
    pub code: String,
    pub entry_point: EntryPoint,
    /// Environment with every binding resolved to its final value.
    pub environment: BTreeMap<String, String>,
}

impl DeployedFunction {
    pub fn config(&self) -> Result<FunctionConfig, ProvisioningError> {
        FunctionConfig::from_lookup(|name| self.environment.get(name).cloned()).map_err(|source| {
            ProvisioningError::Environment {
                function: self.id.clone(),
                source,
            }
        })
    }
}

/// The realized state of one applied topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub topology: String,
    pub version: u32,
    pub applied_at: DateTime<Utc>,
    pub table: DeployedTable,
    pub functions: BTreeMap<String, DeployedFunction>,
    pub grants: BTreeSet<GrantEdge>,
    pub api_name: String,
    pub routes: Vec<RouteSpec>,
}

impl Deployment {
    /// Resolve `topology` into the deployment it describes, without touching
    /// any backend.
    pub fn resolve(
        topology: &Topology,
        applied_at: DateTime<Utc>,
    ) -> Result<Self, ProvisioningError> {
        topology.validate()?;

        let table_name = topology.table_physical_name();
        let partition_key = &topology.table.partition_key.name;

        let mut functions = BTreeMap::new();
        for spec in &topology.functions {
            let environment = spec
                .environment
                .iter()
                .map(|(name, value)| {
                    let resolved = match value {
                        EnvValue::Literal(v) => v.clone(),
                        EnvValue::TableName(_) => table_name.clone(),
                        EnvValue::PartitionKey(_) => partition_key.clone(),
                    };
                    (name.clone(), resolved)
                })
                .collect();

            let function = DeployedFunction {
                id: spec.id.clone(),
                runtime: spec.runtime,
                code: spec.code.clone(),
                entry_point: spec.entry_point,
                environment,
            };
            let config = function.config()?;
            if config.primary_key != *partition_key {
                return Err(ProvisioningError::Environment {
                    function: spec.id.clone(),
                    source: ConfigError::Invalid {
                        name: ENV_PRIMARY_KEY,
                        reason: format!(
                            "`{}` is not the partition key `{partition_key}` of table {table_name}",
                            config.primary_key
                        ),
                    },
                });
            }
            functions.insert(spec.id.clone(), function);
        }

        let grants = topology
            .grants
            .iter()
            .flat_map(|grant| {
                let table_name = &table_name;
                grant.access.capabilities().iter().map(move |&capability| GrantEdge {
                    function: grant.function.clone(),
                    table: table_name.clone(),
                    capability,
                })
            })
            .collect();

        Ok(Self {
            topology: topology.name.clone(),
            version: topology.version,
            applied_at,
            table: DeployedTable {
                id: topology.table.id.clone(),
                physical_name: table_name,
                partition_key: topology.table.partition_key.clone(),
                removal_policy: topology.table.removal_policy,
            },
            functions,
            grants,
            api_name: topology.api.name.clone(),
            routes: topology.api.routes.clone(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Build the runnable handler of every function. Each one gets a store
    /// handle scoped to exactly the grants resolved for it.
    pub fn instantiate_functions(
        &self,
        provider: &dyn ResourceProvider,
    ) -> Result<BTreeMap<String, Arc<dyn ComputeFunction>>, ProvisioningError> {
        let mut handlers = BTreeMap::new();
        for function in self.functions.values() {
            let config = function.config()?;
            let capabilities = capabilities_for(&self.grants, &function.id, &config.table_name);
            if capabilities.is_empty() {
                warn!(
                    function = %function.id,
                    table = %config.table_name,
                    "function has no grant on its table"
                );
            }

            let store = ScopedStore::new(
                provider.open_table(&config.table_name, &config.primary_key),
                function.id.clone(),
                capabilities,
            );
            handlers.insert(
                function.id.clone(),
                instantiate(function.entry_point, &config, Arc::new(store)),
            );
        }
        Ok(handlers)
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Table,
    Function,
    Grant,
    Route,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Table => f.write_str("table"),
            ResourceKind::Function => f.write_str("function"),
            ResourceKind::Grant => f.write_str("grant"),
            ResourceKind::Route => f.write_str("route"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    /// In-place change of metadata only.
    Update,
    /// Destroy and recreate.
    Replace,
    Delete,
    /// No longer managed but left in place with its data.
    Retain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceChange {
    pub kind: ResourceKind,
    pub id: String,
    pub action: ChangeAction,
}

/// Per-resource diff between a recorded deployment and a desired one, in
/// provisioning order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub changes: Vec<ResourceChange>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    fn push(&mut self, kind: ResourceKind, id: impl Into<String>, action: ChangeAction) {
        self.changes.push(ResourceChange {
            kind,
            id: id.into(),
            action,
        });
    }

    fn diff_keyed<T: PartialEq>(
        &mut self,
        kind: ResourceKind,
        previous: &BTreeMap<String, T>,
        desired: &BTreeMap<String, T>,
        changed: ChangeAction,
    ) {
        for (id, want) in desired {
            match previous.get(id) {
                None => self.push(kind, id.clone(), ChangeAction::Create),
                Some(have) if have != want => self.push(kind, id.clone(), changed),
                Some(_) => {}
            }
        }
        for id in previous.keys().filter(|id| !desired.contains_key(*id)) {
            self.push(kind, id.clone(), ChangeAction::Delete);
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.changes.is_empty() {
            return writeln!(f, "no changes");
        }
        for change in &self.changes {
            let marker = match change.action {
                ChangeAction::Create => "+",
                ChangeAction::Update => "~",
                ChangeAction::Replace => "-/+",
                ChangeAction::Delete => "-",
                ChangeAction::Retain => "=",
            };
            writeln!(f, "{marker} {} {}", change.kind, change.id)?;
        }
        Ok(())
    }
}

fn route_key(route: &RouteSpec) -> String {
    format!("{} {} -> {}", route.method, route.path, route.function)
}

/// Diff `desired` against `previous` (nothing deployed when `None`).
///
/// Changing the partition key of a deployed table would destroy its items;
/// that change is refused here rather than planned.
pub fn plan(
    previous: Option<&Deployment>,
    desired: &Deployment,
) -> Result<Plan, ProvisioningError> {
    let mut plan = Plan::default();

    let Some(previous) = previous else {
        plan.push(ResourceKind::Table, &desired.table.physical_name, ChangeAction::Create);
        for id in desired.functions.keys() {
            plan.push(ResourceKind::Function, id.clone(), ChangeAction::Create);
        }
        for edge in &desired.grants {
            plan.push(ResourceKind::Grant, edge.to_string(), ChangeAction::Create);
        }
        for route in &desired.routes {
            plan.push(ResourceKind::Route, route_key(route), ChangeAction::Create);
        }
        return Ok(plan);
    };

    let (have, want) = (&previous.table, &desired.table);
    if have.physical_name != want.physical_name {
        let retired = match have.removal_policy {
            RemovalPolicy::Destroy => ChangeAction::Delete,
            RemovalPolicy::Retain => ChangeAction::Retain,
        };
        plan.push(ResourceKind::Table, &want.physical_name, ChangeAction::Create);
        plan.push(ResourceKind::Table, &have.physical_name, retired);
    } else if have.partition_key != want.partition_key {
        return Err(ProvisioningError::ReplacementRefused {
            table: want.physical_name.clone(),
            reason: format!(
                "partition key changed from `{}` to `{}`; replacing would destroy stored items",
                have.partition_key.name, want.partition_key.name
            ),
        });
    } else if have != want {
        plan.push(ResourceKind::Table, &want.physical_name, ChangeAction::Update);
    }

    // Functions are immutable once deployed: any difference replaces them.
    plan.diff_keyed(
        ResourceKind::Function,
        &previous.functions,
        &desired.functions,
        ChangeAction::Replace,
    );

    for edge in desired.grants.difference(&previous.grants) {
        plan.push(ResourceKind::Grant, edge.to_string(), ChangeAction::Create);
    }
    for edge in previous.grants.difference(&desired.grants) {
        plan.push(ResourceKind::Grant, edge.to_string(), ChangeAction::Delete);
    }

    let have: BTreeSet<String> = previous.routes.iter().map(route_key).collect();
    let want: BTreeSet<String> = desired.routes.iter().map(route_key).collect();
    for key in want.difference(&have) {
        plan.push(ResourceKind::Route, key.clone(), ChangeAction::Create);
    }
    for key in have.difference(&want) {
        plan.push(ResourceKind::Route, key.clone(), ChangeAction::Delete);
    }

    Ok(plan)
}

// ---------------------------------------------------------------------------
// Provisioner
// ---------------------------------------------------------------------------

/// Result of a successful apply.
#[derive(Debug, Clone)]
pub struct Applied {
    pub deployment: Deployment,
    pub plan: Plan,
    /// Retired tables the plan deletes but the provider failed to delete.
    pub leftover: Vec<String>,
}

/// Outcome of tearing a deployment down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Teardown {
    pub deleted: Vec<String>,
    pub retained: Vec<String>,
}

pub struct Provisioner {
    provider: Arc<dyn ResourceProvider>,
}

impl Provisioner {
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &dyn ResourceProvider {
        self.provider.as_ref()
    }

    /// Apply `topology` on top of `previous`.
    ///
    /// On failure every table created by this attempt is deleted again, so
    /// the backend is back in its pre-attempt state; if that cleanup fails
    /// too the error is [`ProvisioningError::Partial`].
    pub async fn apply(
        &self,
        previous: Option<&Deployment>,
        topology: &Topology,
    ) -> Result<Applied, ProvisioningError> {
        let desired = Deployment::resolve(topology, Utc::now())?;
        let plan = plan(previous, &desired)?;

        let mut created = Vec::new();
        if let Err(source) = self.materialize(previous, &desired, &mut created).await {
            return Err(self.rollback(source, created).await);
        }

        let mut leftover = Vec::new();
        let renamed = previous.filter(|p| p.table.physical_name != desired.table.physical_name);
        if let Some(previous) = renamed {
            if let Err(e) = self.retire_table(&previous.table).await {
                error!(
                    table = %previous.table.physical_name,
                    error = %e,
                    "could not delete retired table"
                );
                leftover.push(previous.table.physical_name.clone());
            }
        }

        info!(
            topology = %desired.topology,
            version = desired.version,
            changes = plan.changes.len(),
            leftover = leftover.len(),
            "topology applied"
        );
        Ok(Applied {
            deployment: desired,
            plan,
            leftover,
        })
    }

    /// Tear `deployment` down, honoring the table's removal policy.
    pub async fn destroy(&self, deployment: &Deployment) -> Result<Teardown, ProvisioningError> {
        let mut teardown = Teardown::default();
        match deployment.table.removal_policy {
            RemovalPolicy::Destroy => {
                self.provider.delete_table(&deployment.table.physical_name).await?;
                teardown.deleted.push(deployment.table.physical_name.clone());
            }
            RemovalPolicy::Retain => {
                info!(table = %deployment.table.physical_name, "retaining table on teardown");
                teardown.retained.push(deployment.table.physical_name.clone());
            }
        }
        info!(topology = %deployment.topology, "topology destroyed");
        Ok(teardown)
    }

    async fn materialize(
        &self,
        previous: Option<&Deployment>,
        desired: &Deployment,
        created: &mut Vec<String>,
    ) -> Result<(), ProvisioningError> {
        let table = &desired.table;
        let owned = previous.filter(|p| p.table.physical_name == table.physical_name);

        match owned {
            Some(_) => {
                if !self.provider.table_exists(&table.physical_name).await? {
                    warn!(table = %table.physical_name, "recorded table is missing, recreating");
                    self.provider.create_table(&table.physical_name, &table.partition_key).await?;
                    created.push(table.physical_name.clone());
                }
            }
            None => {
                self.provider.create_table(&table.physical_name, &table.partition_key).await?;
                created.push(table.physical_name.clone());
            }
        }

        for function in desired.functions.values() {
            let config = function.config()?;
            if !self.provider.table_exists(&config.table_name).await? {
                return Err(ProvisioningError::DanglingTable {
                    function: function.id.clone(),
                    table: config.table_name,
                });
            }
        }

        Ok(())
    }

    async fn rollback(&self, source: ProvisioningError, created: Vec<String>) -> ProvisioningError {
        let mut leftover = Vec::new();
        for name in created.into_iter().rev() {
            if let Err(e) = self.provider.delete_table(&name).await {
                warn!(table = %name, error = %e, "rollback could not delete table");
                leftover.push(name);
            }
        }

        if leftover.is_empty() {
            warn!(error = %source, "apply failed, rolled back");
            source
        } else {
            ProvisioningError::Partial {
                source: Box::new(source),
                leftover,
            }
        }
    }

    async fn retire_table(&self, table: &DeployedTable) -> Result<(), ProvisioningError> {
        match table.removal_policy {
            RemovalPolicy::Retain => {
                info!(table = %table.physical_name, "retaining table no longer in topology");
                Ok(())
            }
            RemovalPolicy::Destroy => self.provider.delete_table(&table.physical_name).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::access::Capability;
    use crate::config::ENV_TABLE_NAME;
    use crate::function::FunctionRequest;
    use crate::memory::MemoryBackend;

    fn provisioner(backend: &MemoryBackend) -> Provisioner {
        Provisioner::new(Arc::new(backend.clone()))
    }

    #[tokio::test]
    async fn first_apply_creates_everything() {
        let backend = MemoryBackend::new();
        let applied = provisioner(&backend)
            .apply(None, &Topology::items_service())
            .await
            .unwrap();

        assert_eq!(backend.table_names(), vec!["items".to_string()]);
        assert!(applied.plan.changes.iter().all(|c| c.action == ChangeAction::Create));
        // 1 table, 2 functions, 4 grant edges, 2 routes
        assert_eq!(applied.plan.changes.len(), 9);

        let env = &applied.deployment.functions["getOneFunction"].environment;
        assert_eq!(env.get(ENV_TABLE_NAME).map(String::as_str), Some("items"));
    }

    #[tokio::test]
    async fn reapply_is_idempotent() {
        let backend = MemoryBackend::new();
        let provisioner = provisioner(&backend);
        let topology = Topology::items_service();

        let first = provisioner.apply(None, &topology).await.unwrap();
        let second = provisioner
            .apply(Some(&first.deployment), &topology)
            .await
            .unwrap();

        assert!(second.plan.is_empty(), "{}", second.plan);
        assert_eq!(second.plan.to_string(), "no changes\n");
        assert_eq!(backend.table_names(), vec!["items".to_string()]);
    }

    #[tokio::test]
    async fn changed_function_is_replaced() {
        let backend = MemoryBackend::new();
        let provisioner = provisioner(&backend);
        let mut topology = Topology::items_service();
        let first = provisioner.apply(None, &topology).await.unwrap();

        topology.version = 2;
        topology.functions[0].code = "./artifacts/get-one-v2.zip".into();
        let second = provisioner
            .apply(Some(&first.deployment), &topology)
            .await
            .unwrap();

        assert_eq!(
            second.plan.changes,
            vec![ResourceChange {
                kind: ResourceKind::Function,
                id: "getOneFunction".into(),
                action: ChangeAction::Replace,
            }]
        );
    }

    #[tokio::test]
    async fn removed_grant_shows_in_plan_and_denies_access() {
        let backend = MemoryBackend::new();
        let provisioner = provisioner(&backend);
        let mut topology = Topology::items_service();
        let first = provisioner.apply(None, &topology).await.unwrap();

        topology.grants.retain(|g| g.function != "getOneFunction");
        let second = provisioner
            .apply(Some(&first.deployment), &topology)
            .await
            .unwrap();
        assert_eq!(second.plan.changes.len(), 2);
        assert!(second.plan.changes.iter().all(|c| c.kind == ResourceKind::Grant
            && c.action == ChangeAction::Delete));

        let functions = second.deployment.instantiate_functions(&backend).unwrap();
        let response = functions["getOneFunction"]
            .handle(FunctionRequest {
                method: "GET".into(),
                path: "/items/abc".into(),
                path_parameters: BTreeMap::from([("id".into(), "abc".into())]),
                ..Default::default()
            })
            .await;
        assert_eq!(response.body["error"], "access_denied");
    }

    #[tokio::test]
    async fn existing_foreign_table_is_a_duplicate() {
        let backend = MemoryBackend::new();
        backend
            .create_table("items", &KeySchema::string("itemId"))
            .await
            .unwrap();

        let err = provisioner(&backend)
            .apply(None, &Topology::items_service())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::DuplicateResource(_)));
    }

    #[tokio::test]
    async fn failed_apply_rolls_back_created_table() {
        let backend = MemoryBackend::new();
        let mut topology = Topology::items_service();
        topology.functions[1]
            .environment
            .insert(ENV_TABLE_NAME.into(), EnvValue::Literal("ghost".into()));

        let err = provisioner(&backend).apply(None, &topology).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisioningError::DanglingTable { ref table, .. } if table == "ghost"
        ));
        assert!(backend.table_names().is_empty());
    }

    struct StuckDelete {
        inner: MemoryBackend,
        fail: AtomicBool,
    }

    #[async_trait]
    impl ResourceProvider for StuckDelete {
        async fn table_exists(&self, name: &str) -> Result<bool, ProvisioningError> {
            self.inner.table_exists(name).await
        }
        async fn create_table(&self, name: &str, key: &KeySchema) -> Result<(), ProvisioningError> {
            self.inner.create_table(name, key).await
        }
        async fn delete_table(&self, name: &str) -> Result<(), ProvisioningError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProvisioningError::Backend("delete throttled".into()));
            }
            self.inner.delete_table(name).await
        }
        fn open_table(&self, name: &str, primary_key: &str) -> Arc<dyn ItemStore> {
            self.inner.open_table(name, primary_key)
        }
    }

    #[tokio::test]
    async fn failed_rollback_reports_leftovers() {
        let backend = MemoryBackend::new();
        let provisioner = Provisioner::new(Arc::new(StuckDelete {
            inner: backend.clone(),
            fail: AtomicBool::new(true),
        }));
        let mut topology = Topology::items_service();
        topology.functions[0]
            .environment
            .insert(ENV_TABLE_NAME.into(), EnvValue::Literal("ghost".into()));

        let err = provisioner.apply(None, &topology).await.unwrap_err();
        match err {
            ProvisioningError::Partial { leftover, .. } => assert_eq!(leftover, vec!["items"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn partition_key_change_is_refused() {
        let backend = MemoryBackend::new();
        let provisioner = provisioner(&backend);
        let mut topology = Topology::items_service();
        let first = provisioner.apply(None, &topology).await.unwrap();

        topology.table.partition_key = KeySchema::string("sku");
        let desired = Deployment::resolve(&topology, Utc::now()).unwrap();
        assert!(matches!(
            plan(Some(&first.deployment), &desired),
            Err(ProvisioningError::ReplacementRefused { .. })
        ));

        let err = provisioner
            .apply(Some(&first.deployment), &topology)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::ReplacementRefused { .. }));
        assert_eq!(backend.table_names(), vec!["items".to_string()]);
    }

    #[test]
    fn primary_key_must_name_the_partition_key() {
        let mut topology = Topology::items_service();
        for function in &mut topology.functions {
            function
                .environment
                .insert(ENV_PRIMARY_KEY.into(), EnvValue::Literal("sku".into()));
        }

        let err = Deployment::resolve(&topology, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            ProvisioningError::Environment {
                source: ConfigError::Invalid { name: ENV_PRIMARY_KEY, .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn mismatched_primary_key_creates_nothing() {
        let backend = MemoryBackend::new();
        let mut topology = Topology::items_service();
        topology.functions[1]
            .environment
            .insert(ENV_PRIMARY_KEY.into(), EnvValue::Literal("sku".into()));

        let err = provisioner(&backend).apply(None, &topology).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisioningError::Environment { ref function, .. } if function == "createItemFunction"
        ));
        assert!(backend.table_names().is_empty());
    }

    #[test]
    fn key_binding_follows_the_table() {
        let mut topology = Topology::items_service();
        topology.table.partition_key = KeySchema::string("sku");
        let deployment = Deployment::resolve(&topology, Utc::now()).unwrap();
        for function in deployment.functions.values() {
            assert_eq!(function.environment[ENV_PRIMARY_KEY], "sku");
        }
    }

    #[tokio::test]
    async fn renamed_table_retires_old_one() {
        let backend = MemoryBackend::new();
        let provisioner = provisioner(&backend);
        let mut topology = Topology::items_service();
        let first = provisioner.apply(None, &topology).await.unwrap();

        topology.table.table_name = Some("items-v2".into());
        let second = provisioner
            .apply(Some(&first.deployment), &topology)
            .await
            .unwrap();

        assert_eq!(backend.table_names(), vec!["items-v2".to_string()]);
        assert_eq!(second.plan.changes[0].action, ChangeAction::Create);
        assert_eq!(second.plan.changes[1].action, ChangeAction::Delete);
        assert!(second.leftover.is_empty());
    }

    #[tokio::test]
    async fn renamed_retained_table_is_planned_as_retained() {
        let backend = MemoryBackend::new();
        let provisioner = provisioner(&backend);
        let mut topology = Topology::items_service();
        topology.table.removal_policy = RemovalPolicy::Retain;
        let first = provisioner.apply(None, &topology).await.unwrap();

        topology.table.table_name = Some("items-v2".into());
        let second = provisioner
            .apply(Some(&first.deployment), &topology)
            .await
            .unwrap();

        assert_eq!(
            second.plan.changes[1],
            ResourceChange {
                kind: ResourceKind::Table,
                id: "items".into(),
                action: ChangeAction::Retain,
            }
        );
        assert!(second.plan.to_string().contains("= table items\n"));
        assert_eq!(
            backend.table_names(),
            vec!["items".to_string(), "items-v2".to_string()]
        );
        assert!(second.leftover.is_empty());
    }

    #[tokio::test]
    async fn undeletable_retired_table_is_reported() {
        let backend = MemoryBackend::new();
        let provisioner = Provisioner::new(Arc::new(StuckDelete {
            inner: backend.clone(),
            fail: AtomicBool::new(true),
        }));
        let mut topology = Topology::items_service();
        let first = provisioner.apply(None, &topology).await.unwrap();

        topology.table.table_name = Some("items-v2".into());
        let second = provisioner
            .apply(Some(&first.deployment), &topology)
            .await
            .unwrap();

        assert_eq!(second.leftover, vec!["items".to_string()]);
        assert_eq!(
            backend.table_names(),
            vec!["items".to_string(), "items-v2".to_string()]
        );
    }

    #[tokio::test]
    async fn destroy_honors_removal_policy() {
        let backend = MemoryBackend::new();
        let provisioner = provisioner(&backend);

        let mut topology = Topology::items_service();
        topology.table.removal_policy = RemovalPolicy::Retain;
        let applied = provisioner.apply(None, &topology).await.unwrap();
        let teardown = provisioner.destroy(&applied.deployment).await.unwrap();
        assert_eq!(teardown.retained, vec!["items".to_string()]);
        assert_eq!(backend.table_names(), vec!["items".to_string()]);

        let mut destroyed = applied.deployment.clone();
        destroyed.table.removal_policy = RemovalPolicy::Destroy;
        let teardown = provisioner.destroy(&destroyed).await.unwrap();
        assert_eq!(teardown.deleted, vec!["items".to_string()]);
        assert!(backend.table_names().is_empty());
    }

    #[test]
    fn grants_expand_to_capability_edges() {
        let deployment = Deployment::resolve(&Topology::items_service(), Utc::now()).unwrap();
        assert_eq!(deployment.grants.len(), 4);
        assert!(deployment.grants.contains(&GrantEdge {
            function: "createItemFunction".into(),
            table: "items".into(),
            capability: Capability::Write,
        }));
    }

    #[test]
    fn deployment_record_round_trips() {
        let deployment = Deployment::resolve(&Topology::items_service(), Utc::now()).unwrap();
        let json = deployment.to_json_pretty().unwrap();
        assert_eq!(Deployment::from_json(&json).unwrap(), deployment);
    }
}
