//! API Gateway REST proxy integration: events in, responses out.

use std::collections::{BTreeMap, HashMap};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use items_core::{FunctionRequest, FunctionResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FunctionError;

/// The subset of a proxy event the handlers consume.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyEvent {
    pub http_method: String,
    pub path: String,
    #[serde(default)]
    pub path_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

/// Decode a raw invocation payload into a function request.
pub fn decode_event(payload: Value) -> Result<FunctionRequest, FunctionError> {
    let event: ProxyEvent = serde_json::from_value(payload)?;

    let body = match event.body {
        Some(body) if event.is_base64_encoded => {
            let bytes = STANDARD.decode(body.as_bytes())?;
            Some(String::from_utf8(bytes)?)
        }
        other => other,
    };

    Ok(FunctionRequest {
        method: event.http_method,
        path: event.path,
        path_parameters: event.path_parameters.unwrap_or_default().into_iter().collect(),
        headers: event
            .headers
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect(),
        body,
    })
}

pub fn encode_response(response: FunctionResponse) -> ProxyResponse {
    ProxyResponse {
        status_code: response.status_code,
        headers: response.headers,
        body: response.body.to_string(),
        is_base64_encoded: false,
    }
}
