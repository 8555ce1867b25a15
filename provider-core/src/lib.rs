//! provider-core: declarative resource framework for the Consul provider.
pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod observability;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod retry;
pub mod schema;
pub mod state;
pub mod utils;

pub use async_trait;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;

pub use error::{ErrorKind, OperationError, ProviderError, Result};
pub use plan::Plan;
pub use provider::{Provider, Reconciled};
pub use resource::{DataSource, Resource};
pub use schema::{Attribute, Schema};
pub use state::{AttrRead, Block, ResourceData, ResourceState, StateWriter};
