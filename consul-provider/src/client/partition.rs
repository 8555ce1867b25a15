use super::{escape, ConsulClient};
use crate::options::{ReadOptions, WriteOptions};
use provider_core::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AdminPartition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing)]
    pub deleted_at: Option<String>,
}

impl ConsulClient {
    pub async fn partition_create(&self, partition: &AdminPartition, opts: &WriteOptions) -> Result<AdminPartition> {
        self.put("/v1/partition", opts, partition).await
    }

    pub async fn partition_read(&self, name: &str, opts: &ReadOptions) -> Result<Option<AdminPartition>> {
        let path = format!("/v1/partition/{}", escape(name));
        let found: Option<(Option<AdminPartition>, _)> = self.get_optional(&path, opts, &[]).await?;
        Ok(found
            .and_then(|(p, _)| p)
            .filter(|p| p.deleted_at.is_none()))
    }

    pub async fn partition_update(&self, partition: &AdminPartition, opts: &WriteOptions) -> Result<AdminPartition> {
        let path = format!("/v1/partition/{}", escape(&partition.name));
        self.put(&path, opts, partition).await
    }

    pub async fn partition_delete(&self, name: &str, opts: &WriteOptions) -> Result<()> {
        self.delete(&format!("/v1/partition/{}", escape(name)), opts, &[])
            .await
    }
}
