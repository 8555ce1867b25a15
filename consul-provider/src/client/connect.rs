//! Service-mesh endpoints: intentions and the CA configuration.

use super::acl::null_as_default;
use super::{escape, ConsulClient};
use crate::options::{ReadOptions, WriteOptions};
use provider_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Intention {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub source_name: String,
    #[serde(rename = "SourceNS", default, skip_serializing_if = "String::is_empty")]
    pub source_ns: String,
    pub destination_name: String,
    #[serde(rename = "DestinationNS", default, skip_serializing_if = "String::is_empty")]
    pub destination_ns: String,
    #[serde(default = "consul_source_type")]
    pub source_type: String,
    pub action: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: BTreeMap<String, String>,
}

fn consul_source_type() -> String {
    "consul".to_string()
}

#[derive(Debug, Deserialize)]
struct Created {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CaConfiguration {
    pub provider: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: Map<String, Value>,
}

impl ConsulClient {
    pub async fn intention_create(&self, intention: &Intention, opts: &WriteOptions) -> Result<String> {
        let created: Created = self.post("/v1/connect/intentions", opts, intention).await?;
        Ok(created.id)
    }

    pub async fn intention_read(&self, id: &str, opts: &ReadOptions) -> Result<Option<Intention>> {
        let path = format!("/v1/connect/intentions/{}", escape(id));
        Ok(self.get_optional(&path, opts, &[]).await?.map(|(i, _)| i))
    }

    pub async fn intention_update(&self, intention: &Intention, opts: &WriteOptions) -> Result<()> {
        let path = format!("/v1/connect/intentions/{}", escape(&intention.id));
        let _: Value = self.put(&path, opts, intention).await?;
        Ok(())
    }

    pub async fn intention_delete(&self, id: &str, opts: &WriteOptions) -> Result<()> {
        self.delete(&format!("/v1/connect/intentions/{}", escape(id)), opts, &[])
            .await
    }

    pub async fn ca_get_config(&self, opts: &ReadOptions) -> Result<CaConfiguration> {
        let (config, _) = self.get("/v1/connect/ca/configuration", opts, &[]).await?;
        Ok(config)
    }

    pub async fn ca_set_config(&self, config: &CaConfiguration, opts: &WriteOptions) -> Result<()> {
        let _: Value = self.put("/v1/connect/ca/configuration", opts, config).await?;
        Ok(())
    }
}
