use thiserror::Error;

/// Environment variable carrying the partition key attribute name.
pub const ENV_PRIMARY_KEY: &str = "PRIMARY_KEY";

/// Environment variable carrying the physical table name.
pub const ENV_TABLE_NAME: &str = "TABLE_NAME";

/// Table identity handed to a compute function at deploy time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionConfig {
    pub primary_key: String,
    pub table_name: String,
}

impl FunctionConfig {
    /// Read `PRIMARY_KEY` and `TABLE_NAME` from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through an arbitrary variable lookup, e.g. the
    /// resolved environment of a deployed function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| match lookup(name) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ConfigError::Missing(name)),
        };

        Ok(Self {
            primary_key: required(ENV_PRIMARY_KEY)?,
            table_name: required(ENV_TABLE_NAME)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}
