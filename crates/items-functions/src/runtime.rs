use std::sync::Arc;

use items_core::function::instantiate;
use items_core::topology::EntryPoint;
use items_core::{ComputeFunction, DynamoStore, FunctionConfig, FunctionResponse};
use lambda_runtime::{Error, LambdaEvent, service_fn};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::apigw::{ProxyResponse, decode_event, encode_response};
use crate::errors::FunctionError;

/// Handle one API Gateway proxy invocation.
pub async fn handle_event(
    function: &dyn ComputeFunction,
    payload: Value,
) -> Result<ProxyResponse, FunctionError> {
    let request = match decode_event(payload) {
        Ok(request) => request,
        Err(e @ FunctionError::Utf8(_)) => {
            return Ok(encode_response(FunctionResponse::validation(e.to_string())));
        }
        Err(e) => return Err(e),
    };
    let response = function.handle(request).await;
    Ok(encode_response(response))
}

/// Cold start: read the table binding from the environment, connect to
/// DynamoDB, then serve invocations until the runtime shuts down.
pub async fn run(entry_point: EntryPoint) -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .without_time()
        .init();

    let config = FunctionConfig::from_env().map_err(FunctionError::from)?;
    info!(
        function = %entry_point,
        table = %config.table_name,
        primary_key = %config.primary_key,
        "function starting"
    );

    let store = DynamoStore::new(&config.table_name, &config.primary_key).await;
    let function = instantiate(entry_point, &config, Arc::new(store));

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let function = Arc::clone(&function);
        async move { Ok::<_, Error>(handle_event(function.as_ref(), event.payload).await?) }
    }))
    .await
}
