//! Handler traits implemented once per object kind.

use crate::error::{ProviderError, Result};
use crate::schema::Schema;
use crate::state::ResourceData;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Lifecycle handler for one managed object kind.
///
/// `M` is the provider-scoped context (client and defaults) built at configure time.
#[async_trait]
pub trait Resource<M: Sync>: Send + Sync {
    fn schema(&self) -> Schema;

    /// Create the object and record its identifier, then populate computed attributes.
    async fn create(&self, meta: &M, d: &mut ResourceData) -> Result<()>;

    /// Refresh the stored attributes. A missing object clears the identifier.
    async fn read(&self, meta: &M, d: &mut ResourceData) -> Result<()>;

    /// Apply changes to attributes that are not force-new.
    async fn update(&self, _meta: &M, _d: &mut ResourceData) -> Result<()> {
        Err(ProviderError::invalid(
            "this resource does not support in-place updates",
        ))
    }

    async fn delete(&self, meta: &M, d: &mut ResourceData) -> Result<()>;

    fn importable(&self) -> bool {
        false
    }

    /// Seed the data from an import identifier before the first read.
    async fn import(&self, _meta: &M, _d: &mut ResourceData) -> Result<()> {
        Ok(())
    }

    /// Upgrade stored attributes written by schema version `from_version`.
    fn migrate_state(
        &self,
        _from_version: u32,
        attributes: Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        Ok(attributes)
    }
}

/// Read-only lookup exposed to the host.
#[async_trait]
pub trait DataSource<M: Sync>: Send + Sync {
    fn schema(&self) -> Schema;

    async fn read(&self, meta: &M, d: &mut ResourceData) -> Result<()>;
}
