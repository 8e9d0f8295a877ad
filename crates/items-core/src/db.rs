use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::client::Waiters;
use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
    ScalarAttributeType,
};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::CoreError;
use crate::model::{Item, ItemId};
use crate::provision::{ProvisioningError, ResourceProvider};
use crate::store::ItemStore;
use crate::topology::KeySchema;

/// Service error codes that DynamoDB documents as safe to retry.
const TRANSIENT_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "ThrottlingException",
    "InternalServerError",
    "ServiceUnavailable",
];

/// How long to wait for a freshly created table to become ACTIVE.
const TABLE_ACTIVE_TIMEOUT: Duration = Duration::from_secs(120);

/// Load AWS configuration from the environment and build a DynamoDB client.
pub async fn load_client() -> Client {
    let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    Client::new(&config)
}

/// DynamoDB client wrapper for one items table.
#[derive(Clone)]
pub struct DynamoStore {
    client: Client,
    table_name: String,
    primary_key: String,
}

impl DynamoStore {
    /// Create a new `DynamoStore` by loading AWS configuration from the
    /// environment and constructing a DynamoDB client.
    pub async fn new(table_name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self::from_client(load_client().await, table_name, primary_key)
    }

    pub fn from_client(
        client: Client,
        table_name: impl Into<String>,
        primary_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            primary_key: primary_key.into(),
        }
    }

    /// The partition key attribute name.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    fn classify<E, R>(&self, err: SdkError<E, R>) -> CoreError
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
        R: std::fmt::Debug + Send + Sync + 'static,
    {
        classify_sdk_error(err, &self.table_name)
    }
}

#[async_trait]
impl ItemStore for DynamoStore {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn get(&self, id: &ItemId) -> Result<Item, CoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(&self.primary_key, AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let Some(attributes) = output.item else {
            return Err(CoreError::NotFound(format!("item {id}")));
        };

        let document: Map<String, Value> = serde_dynamo::from_item(attributes)?;
        Ok(Item::from_document(&self.primary_key, document)?)
    }

    async fn put(&self, item: &Item) -> Result<(), CoreError> {
        let attributes: HashMap<String, AttributeValue> =
            serde_dynamo::to_item(item.to_document(&self.primary_key))?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(attributes))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        debug!(table = %self.table_name, item_id = %item.id, "item written");
        Ok(())
    }
}

/// Map an SDK failure onto the storage error taxonomy.
fn classify_sdk_error<E, R>(err: SdkError<E, R>, table: &str) -> CoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let code = err
        .as_service_error()
        .and_then(|e| e.code())
        .map(str::to_owned);

    match code.as_deref() {
        Some("AccessDeniedException") => {
            return CoreError::AccessDenied(format!("table {table}: {}", err_message(&err)));
        }
        Some("ResourceNotFoundException") => return CoreError::TableMissing(table.to_string()),
        Some(code) if TRANSIENT_CODES.contains(&code) => {
            return CoreError::StorageUnavailable(format!("table {table}: {code}"));
        }
        _ => {}
    }

    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            CoreError::StorageUnavailable(format!("table {table}: {err}"))
        }
        other => CoreError::DynamoSdk(Box::new(other)),
    }
}

fn err_message<E: ProvideErrorMetadata, R>(err: &SdkError<E, R>) -> String {
    err.as_service_error()
        .and_then(|e| e.message())
        .unwrap_or("access denied")
        .to_string()
}

// ---------------------------------------------------------------------------
// Provisioning
// ---------------------------------------------------------------------------

/// Creates and deletes items tables in DynamoDB.
pub struct DynamoProvider {
    client: Client,
}

impl DynamoProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceProvider for DynamoProvider {
    async fn table_exists(&self, name: &str) -> Result<bool, ProvisioningError> {
        match self.client.describe_table().table_name(name).send().await {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|s| s.is_resource_not_found_exception()) =>
            {
                Ok(false)
            }
            Err(e) => Err(ProvisioningError::Backend(format!(
                "describe table {name}: {e}"
            ))),
        }
    }

    async fn create_table(&self, name: &str, key: &KeySchema) -> Result<(), ProvisioningError> {
        let definition = AttributeDefinition::builder()
            .attribute_name(&key.name)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|e| ProvisioningError::Backend(e.to_string()))?;
        let schema = KeySchemaElement::builder()
            .attribute_name(&key.name)
            .key_type(KeyType::Hash)
            .build()
            .map_err(|e| ProvisioningError::Backend(e.to_string()))?;

        self.client
            .create_table()
            .table_name(name)
            .attribute_definitions(definition)
            .key_schema(schema)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|s| s.is_resource_in_use_exception())
                {
                    ProvisioningError::DuplicateResource(format!("table {name}"))
                } else {
                    ProvisioningError::Backend(format!("create table {name}: {e}"))
                }
            })?;

        self.client
            .wait_until_table_exists()
            .table_name(name)
            .wait(TABLE_ACTIVE_TIMEOUT)
            .await
            .map_err(|e| ProvisioningError::Backend(format!("waiting for table {name}: {e}")))?;

        info!(table = name, partition_key = %key.name, "DynamoDB table created");
        Ok(())
    }

    async fn delete_table(&self, name: &str) -> Result<(), ProvisioningError> {
        match self.client.delete_table().table_name(name).send().await {
            Ok(_) => {
                info!(table = name, "DynamoDB table deleted");
                Ok(())
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|s| s.is_resource_not_found_exception()) =>
            {
                Ok(())
            }
            Err(e) => Err(ProvisioningError::Backend(format!("delete table {name}: {e}"))),
        }
    }

    fn open_table(&self, name: &str, primary_key: &str) -> std::sync::Arc<dyn ItemStore> {
        std::sync::Arc::new(DynamoStore::from_client(
            self.client.clone(),
            name,
            primary_key,
        ))
    }
}
