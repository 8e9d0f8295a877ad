use axum::Json;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use items_core::{ConfigError, FunctionResponse, ProvisioningError};

/// Requests the route table has no binding for.
#[derive(Debug)]
pub enum RoutingError {
    /// No route matches the path.
    RouteNotFound { method: String, path: String },
    /// A route matches the path, but not with this method.
    MethodNotAllowed { method: String, path: String },
}

impl IntoResponse for RoutingError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            RoutingError::RouteNotFound { method, path } => (
                StatusCode::NOT_FOUND,
                "route_not_found",
                format!("No route for {method} {path}"),
            ),
            RoutingError::MethodNotAllowed { method, path } => (
                StatusCode::METHOD_NOT_ALLOWED,
                "method_not_allowed",
                format!("Method {method} is not allowed on {path}"),
            ),
        };

        let body = serde_json::json!({ "error": code, "message": message });
        (status, Json(body)).into_response()
    }
}

/// A compute function's response, rendered as-is.
pub struct HttpResponse(pub FunctionResponse);

impl IntoResponse for HttpResponse {
    fn into_response(self) -> Response {
        let FunctionResponse {
            status_code,
            headers,
            body,
        } = self.0;

        let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(body)).into_response();
        for (name, value) in headers {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    response.headers_mut().insert(name, value);
                }
                _ => tracing::warn!(header = %name, "dropping invalid response header"),
            }
        }
        response
    }
}

/// Errors that stop the gateway from starting.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway config error: {0}")]
    Config(#[from] ConfigError),

    #[error("gateway provisioning error: {0}")]
    Provisioning(#[from] ProvisioningError),

    #[error("route {method} {path} is bound to undeployed function {function}")]
    UnboundRoute {
        method: String,
        path: String,
        function: String,
    },

    #[error("gateway I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gateway JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
