pub mod access;
pub mod config;
pub mod db;
pub mod error;
pub mod function;
pub mod memory;
pub mod model;
pub mod provision;
pub mod store;
pub mod topology;

pub use access::{Access, Capability, GrantEdge, ScopedStore};
pub use config::{ConfigError, FunctionConfig};
pub use db::{DynamoProvider, DynamoStore};
pub use error::CoreError;
pub use function::{ComputeFunction, FunctionRequest, FunctionResponse};
pub use memory::{MemoryBackend, MemoryStore};
pub use model::{Item, ItemError, ItemId, ItemIdError};
pub use provision::{Deployment, Plan, ProvisioningError, Provisioner, ResourceProvider};
pub use store::ItemStore;
pub use topology::{HttpMethod, RouteSpec, Topology};
