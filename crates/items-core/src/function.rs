//! The compute function contract and the two item handlers.
//!
//! A function turns one [`FunctionRequest`] into one [`FunctionResponse`].
//! Handlers hold only their configuration and a store handle; nothing is
//! carried from one invocation to the next.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::config::FunctionConfig;
use crate::error::CoreError;
use crate::model::{Item, ItemId};
use crate::store::ItemStore;
use crate::topology::EntryPoint;

/// Path parameter bound to the item id on `GET /items/{id}`.
pub const ID_PARAMETER: &str = "id";

/// Seconds a client should wait before retrying a transient failure.
const RETRY_AFTER_SECS: u32 = 1;

/// An HTTP request as forwarded by the routing layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRequest {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub path_parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// A complete HTTP response; the routing layer returns it unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl FunctionResponse {
    pub fn json(status_code: u16, body: Value) -> Self {
        Self {
            status_code,
            headers: BTreeMap::from([("content-type".to_string(), "application/json".to_string())]),
            body,
        }
    }

    pub fn error(status_code: u16, code: &str, message: impl Into<String>) -> Self {
        Self::json(
            status_code,
            json!({ "error": code, "message": message.into() }),
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::error(400, "validation_error", message)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

impl From<CoreError> for FunctionResponse {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(msg) => FunctionResponse::error(404, "not_found", msg),
            CoreError::Item(e) => FunctionResponse::validation(e.to_string()),
            CoreError::StorageUnavailable(msg) => {
                warn!("storage unavailable: {msg}");
                FunctionResponse::error(503, "storage_unavailable", msg)
                    .with_header("retry-after", RETRY_AFTER_SECS.to_string())
            }
            CoreError::AccessDenied(msg) => {
                error!("access denied: {msg}");
                FunctionResponse::error(500, "access_denied", msg)
            }
            CoreError::TableMissing(table) => {
                let message = format!("table {table} does not exist");
                error!("{message}");
                FunctionResponse::error(500, "table_missing", message)
            }
            other => {
                error!("Core error: {other}");
                FunctionResponse::error(500, "internal_error", "Internal server error")
            }
        }
    }
}

/// A stateless request handler.
#[async_trait]
pub trait ComputeFunction: Send + Sync {
    async fn handle(&self, request: FunctionRequest) -> FunctionResponse;
}

/// Build the handler for `entry_point` over `store`.
pub fn instantiate(
    entry_point: EntryPoint,
    config: &FunctionConfig,
    store: Arc<dyn ItemStore>,
) -> Arc<dyn ComputeFunction> {
    match entry_point {
        EntryPoint::CreateOne => Arc::new(CreateOne::new(config, store)),
        EntryPoint::GetOne => Arc::new(GetOne::new(config, store)),
    }
}

// ---------------------------------------------------------------------------
// createOne
// ---------------------------------------------------------------------------

/// `POST /items`: validates the body and writes it, overwriting any item with
/// the same id.
pub struct CreateOne {
    primary_key: String,
    store: Arc<dyn ItemStore>,
}

impl CreateOne {
    pub fn new(config: &FunctionConfig, store: Arc<dyn ItemStore>) -> Self {
        Self {
            primary_key: config.primary_key.clone(),
            store,
        }
    }

    fn parse(&self, request: &FunctionRequest) -> Result<Item, FunctionResponse> {
        let body = request
            .body
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| FunctionResponse::validation("request body is required"))?;

        let value: Value = serde_json::from_str(body)
            .map_err(|e| FunctionResponse::validation(format!("malformed JSON body: {e}")))?;

        Item::from_json(&self.primary_key, value)
            .map_err(|e| FunctionResponse::validation(e.to_string()))
    }
}

#[async_trait]
impl ComputeFunction for CreateOne {
    async fn handle(&self, request: FunctionRequest) -> FunctionResponse {
        let item = match self.parse(&request) {
            Ok(item) => item,
            Err(response) => return response,
        };

        if let Err(e) = self.store.put(&item).await {
            return e.into();
        }

        info!(table = %self.store.table_name(), item_id = %item.id, "item created");
        FunctionResponse::json(201, Value::Object(item.to_document(&self.primary_key)))
    }
}

// ---------------------------------------------------------------------------
// getOne
// ---------------------------------------------------------------------------

/// `GET /items/{id}`: point lookup by id.
pub struct GetOne {
    primary_key: String,
    store: Arc<dyn ItemStore>,
}

impl GetOne {
    pub fn new(config: &FunctionConfig, store: Arc<dyn ItemStore>) -> Self {
        Self {
            primary_key: config.primary_key.clone(),
            store,
        }
    }
}

#[async_trait]
impl ComputeFunction for GetOne {
    async fn handle(&self, request: FunctionRequest) -> FunctionResponse {
        let Some(raw) = request.path_parameters.get(ID_PARAMETER) else {
            return FunctionResponse::validation(format!("missing path parameter `{ID_PARAMETER}`"));
        };

        let id = match ItemId::new(raw.as_str()) {
            Ok(id) => id,
            Err(e) => return FunctionResponse::validation(e.to_string()),
        };

        match self.store.get(&id).await {
            Ok(item) => {
                FunctionResponse::json(200, Value::Object(item.to_document(&self.primary_key)))
            }
            Err(e) => e.into(),
        }
    }
}
