use items_core::ConfigError;

/// Errors raised before a request reaches the handler.
#[derive(Debug, thiserror::Error)]
pub enum FunctionError {
    /// `PRIMARY_KEY` / `TABLE_NAME` missing at cold start.
    #[error("function config error: {0}")]
    Config(#[from] ConfigError),
    /// The invocation payload is not an API Gateway proxy event.
    #[error("malformed API Gateway event: {0}")]
    Event(#[from] serde_json::Error),
    /// `isBase64Encoded` was set but the body does not decode.
    #[error("request body is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded body is not UTF-8 text. Answered with a 400, not an
    /// invocation failure.
    #[error("request body is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
