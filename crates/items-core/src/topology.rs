//! Declarative description of the items service.
//!
//! A [`Topology`] names every resource by a logical id and wires them
//! together by reference: functions point at the table through environment
//! bindings, grants and routes point at functions. Nothing here talks to a
//! backend; [`crate::provision`] turns a topology into a
//! [`crate::provision::Deployment`].

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::access::Access;
use crate::config::{ENV_PRIMARY_KEY, ENV_TABLE_NAME};
use crate::model::DEFAULT_PRIMARY_KEY;

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
}

/// Partition key of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchema {
    pub name: String,
    pub attribute_type: AttributeType,
}

impl KeySchema {
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attribute_type: AttributeType::String,
        }
    }
}

/// What happens to a table's data when the topology is torn down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    #[default]
    Retain,
    Destroy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub id: String,
    /// Explicit physical name. Derived from the topology name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    pub partition_key: KeySchema,
    #[serde(default)]
    pub removal_policy: RemovalPolicy,
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Runtime {
    #[serde(rename = "provided.al2023")]
    ProvidedAl2023,
    #[serde(rename = "provided.al2")]
    ProvidedAl2,
}

/// Which handler implementation a function runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    CreateOne,
    GetOne,
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryPoint::CreateOne => f.write_str("createOne"),
            EntryPoint::GetOne => f.write_str("getOne"),
        }
    }
}

/// An environment binding, resolved when the topology is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvValue {
    Literal(String),
    /// Physical name of the table with this logical id.
    TableName(String),
    /// Partition key attribute of the table with this logical id.
    PartitionKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub id: String,
    pub runtime: Runtime,
    /// Path of the pre-built deployment artifact.
    pub code: String,
    pub entry_point: EntryPoint,
    #[serde(default)]
    pub environment: BTreeMap<String, EnvValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantSpec {
    pub function: String,
    pub table: String,
    pub access: Access,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteSpec {
    pub method: HttpMethod,
    /// Path pattern; `{name}` segments bind path parameters.
    pub path: String,
    pub function: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSpec {
    pub name: String,
    pub routes: Vec<RouteSpec>,
}

/// Names of the `{param}` segments of a path pattern, in order.
pub fn path_parameters(path: &str) -> Result<Vec<&str>, &'static str> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err("must start with '/'");
    };
    if rest.is_empty() {
        return Ok(Vec::new());
    }

    let mut params = Vec::new();
    for segment in rest.split('/') {
        if segment.is_empty() {
            return Err("empty path segment");
        }
        match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => {
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err("parameter names must be alphanumeric");
                }
                if params.contains(&name) {
                    return Err("duplicate parameter name");
                }
                params.push(name);
            }
            None if segment.contains(['{', '}']) => {
                return Err("braces are only allowed around a whole segment");
            }
            None => {}
        }
    }
    Ok(params)
}

/// `path` with every parameter name erased, so `/items/{id}` and
/// `/items/{key}` compare equal.
fn path_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| if segment.starts_with('{') { "{}" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub name: String,
    /// Revision of this description, bumped by its author on every change.
    pub version: u32,
    pub table: TableSpec,
    pub functions: Vec<FunctionSpec>,
    pub grants: Vec<GrantSpec>,
    pub api: ApiSpec,
}

impl Topology {
    /// The items service: one table, `createOne`/`getOne`, both granted
    /// read/write, routed as `POST /items` and `GET /items/{id}`.
    pub fn items_service() -> Self {
        let environment = BTreeMap::from([
            (
                ENV_PRIMARY_KEY.to_string(),
                EnvValue::PartitionKey("items".to_string()),
            ),
            (
                ENV_TABLE_NAME.to_string(),
                EnvValue::TableName("items".to_string()),
            ),
        ]);

        let function = |id: &str, code: &str, entry_point| FunctionSpec {
            id: id.to_string(),
            runtime: Runtime::ProvidedAl2023,
            code: code.to_string(),
            entry_point,
            environment: environment.clone(),
        };

        let grant = |function: &str| GrantSpec {
            function: function.to_string(),
            table: "items".to_string(),
            access: Access::ReadWrite,
        };

        Self {
            name: "items-service".to_string(),
            version: 1,
            table: TableSpec {
                id: "items".to_string(),
                table_name: Some("items".to_string()),
                partition_key: KeySchema::string(DEFAULT_PRIMARY_KEY),
                removal_policy: RemovalPolicy::Destroy,
            },
            functions: vec![
                function("getOneFunction", "./artifacts/get-one.zip", EntryPoint::GetOne),
                function("createItemFunction", "./artifacts/create.zip", EntryPoint::CreateOne),
            ],
            grants: vec![grant("getOneFunction"), grant("createItemFunction")],
            api: ApiSpec {
                name: "Items Service".to_string(),
                routes: vec![
                    RouteSpec {
                        method: HttpMethod::Post,
                        path: "/items".to_string(),
                        function: "createItemFunction".to_string(),
                    },
                    RouteSpec {
                        method: HttpMethod::Get,
                        path: "/items/{id}".to_string(),
                        function: "getOneFunction".to_string(),
                    },
                ],
            },
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Physical table name: the explicit one, else `<topology>-<table id>`.
    pub fn table_physical_name(&self) -> String {
        self.table
            .table_name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.name, self.table.id))
    }

    pub fn function(&self, id: &str) -> Option<&FunctionSpec> {
        self.functions.iter().find(|f| f.id == id)
    }

    /// Check internal consistency before anything is provisioned.
    pub fn validate(&self) -> Result<(), TopologyError> {
        if self.name.trim().is_empty() {
            return Err(TopologyError::EmptyName);
        }
        if self.table.partition_key.name.is_empty() {
            return Err(TopologyError::EmptyPartitionKey);
        }

        let mut ids = HashSet::from([self.table.id.as_str()]);
        for function in &self.functions {
            if !ids.insert(function.id.as_str()) {
                return Err(TopologyError::DuplicateId(function.id.clone()));
            }
            for (name, value) in &function.environment {
                match value {
                    EnvValue::TableName(table) | EnvValue::PartitionKey(table)
                        if *table != self.table.id =>
                    {
                        return Err(TopologyError::UnknownTable {
                            referenced_by: format!("{}.environment.{name}", function.id),
                            table: table.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }

        for grant in &self.grants {
            if self.function(&grant.function).is_none() {
                return Err(TopologyError::UnknownFunction {
                    referenced_by: "grant".to_string(),
                    function: grant.function.clone(),
                });
            }
            if grant.table != self.table.id {
                return Err(TopologyError::UnknownTable {
                    referenced_by: format!("grant for {}", grant.function),
                    table: grant.table.clone(),
                });
            }
        }

        let mut bindings = HashSet::new();
        let mut shapes: HashMap<String, &str> = HashMap::new();
        for route in &self.api.routes {
            path_parameters(&route.path).map_err(|reason| TopologyError::InvalidPath {
                path: route.path.clone(),
                reason,
            })?;
            match shapes.entry(path_shape(&route.path)) {
                Entry::Occupied(existing) if *existing.get() != route.path => {
                    return Err(TopologyError::ConflictingPath {
                        path: route.path.clone(),
                        existing: existing.get().to_string(),
                    });
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(&route.path);
                }
            }
            if self.function(&route.function).is_none() {
                return Err(TopologyError::UnknownFunction {
                    referenced_by: format!("route {} {}", route.method, route.path),
                    function: route.function.clone(),
                });
            }
            if !bindings.insert((route.method, route.path.as_str())) {
                return Err(TopologyError::DuplicateRoute {
                    method: route.method,
                    path: route.path.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Inconsistencies found by [`Topology::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("topology name must not be empty")]
    EmptyName,

    #[error("table partition key name must not be empty")]
    EmptyPartitionKey,

    #[error("duplicate resource id `{0}`")]
    DuplicateId(String),

    #[error("{referenced_by} references unknown function `{function}`")]
    UnknownFunction {
        referenced_by: String,
        function: String,
    },

    #[error("{referenced_by} references unknown table `{table}`")]
    UnknownTable { referenced_by: String, table: String },

    #[error("route {method} {path} is declared more than once")]
    DuplicateRoute { method: HttpMethod, path: String },

    #[error("route path `{path}` matches the same requests as `{existing}`")]
    ConflictingPath { path: String, existing: String },

    #[error("invalid route path `{path}`: {reason}")]
    InvalidPath { path: String, reason: &'static str },
}
