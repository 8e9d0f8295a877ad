use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, Request};
use axum::http::{Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use items_core::{ComputeFunction, FunctionRequest, FunctionResponse, HttpMethod};

use crate::errors::{GatewayError, HttpResponse, RoutingError};
use crate::state::Gateway;

/// Largest request body forwarded to a function (API Gateway payload limit).
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

type PathParams = Result<Path<HashMap<String, String>>, PathRejection>;

fn method_filter(method: HttpMethod) -> MethodFilter {
    match method {
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Post => MethodFilter::POST,
        HttpMethod::Put => MethodFilter::PUT,
        HttpMethod::Patch => MethodFilter::PATCH,
        HttpMethod::Delete => MethodFilter::DELETE,
    }
}

/// Build the HTTP router from the deployment's route table.
///
/// Every route forwards to exactly one function. Requests matching no path
/// get `route_not_found`; a known path with an unbound method gets
/// `method_not_allowed`.
pub fn router(gateway: &Gateway, timeout: Duration) -> Result<Router, GatewayError> {
    let mut paths: BTreeMap<&str, MethodRouter> = BTreeMap::new();

    for route in &gateway.deployment.routes {
        let function = gateway
            .functions
            .get(&route.function)
            .cloned()
            .ok_or_else(|| GatewayError::UnboundRoute {
                method: route.method.to_string(),
                path: route.path.clone(),
                function: route.function.clone(),
            })?;

        let handler = move |params: PathParams, request: Request| {
            invoke(Arc::clone(&function), params, request)
        };

        let method_router = paths
            .remove(route.path.as_str())
            .unwrap_or_else(MethodRouter::new);
        paths.insert(
            route.path.as_str(),
            method_router.on(method_filter(route.method), handler),
        );
    }

    let mut router = Router::new();
    for (path, method_router) in paths {
        // axum answers HEAD with the GET handler unless HEAD is bound itself.
        let method_router = method_router
            .on(MethodFilter::HEAD, method_not_allowed)
            .fallback(method_not_allowed);
        router = router.route(path, method_router);
    }

    Ok(router
        .fallback(route_not_found)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http()))
}

/// Forward the request verbatim and return the function's response as-is.
async fn invoke(
    function: Arc<dyn ComputeFunction>,
    params: PathParams,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return HttpResponse(FunctionResponse::error(413, "payload_too_large", e.to_string()))
                .into_response();
        }
    };
    let body = match String::from_utf8(body.to_vec()) {
        Ok(body) => body,
        Err(e) => {
            return HttpResponse(FunctionResponse::validation(format!(
                "request body is not valid UTF-8: {e}"
            )))
            .into_response();
        }
    };

    let path_parameters = params
        .map(|Path(params)| params.into_iter().collect())
        .unwrap_or_default();

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect();

    let request = FunctionRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        path_parameters,
        headers,
        body: (!body.is_empty()).then_some(body),
    };

    HttpResponse(function.handle(request).await).into_response()
}

async fn method_not_allowed(method: Method, uri: Uri) -> RoutingError {
    warn!(%method, path = %uri.path(), "method not allowed");
    RoutingError::MethodNotAllowed {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}

async fn route_not_found(method: Method, uri: Uri) -> RoutingError {
    warn!(%method, path = %uri.path(), "no route");
    RoutingError::RouteNotFound {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}
