//! Operator endpoints: autopilot, network areas, license.

use super::acl::null_as_default;
use super::{escape, Body, ConsulClient, WireSecret};
use crate::options::{ReadOptions, WriteOptions};
use provider_core::Result;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AutopilotConfiguration {
    #[serde(default)]
    pub cleanup_dead_servers: bool,
    #[serde(default)]
    pub last_contact_threshold: String,
    #[serde(default)]
    pub max_trailing_logs: u64,
    #[serde(default)]
    pub min_quorum: u32,
    #[serde(default)]
    pub server_stabilization_time: String,
    #[serde(default)]
    pub redundancy_zone_tag: String,
    #[serde(default)]
    pub disable_upgrade_migration: bool,
    #[serde(default)]
    pub upgrade_version_tag: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkArea {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub peer_datacenter: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub retry_join: Vec<String>,
    #[serde(rename = "UseTLS", default)]
    pub use_tls: bool,
}

#[derive(Debug, Deserialize)]
struct Created {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LicenseDetails {
    #[serde(rename = "LicenseID", default)]
    pub license_id: String,
    #[serde(rename = "CustomerID", default)]
    pub customer_id: String,
    #[serde(rename = "InstallationID", default)]
    pub installation_id: String,
    #[serde(default)]
    pub issue_time: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub expiration_time: String,
    #[serde(default)]
    pub product: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub flags: BTreeMap<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LicenseReply {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub license: LicenseDetails,
    #[serde(default, deserialize_with = "null_as_default")]
    pub warnings: Vec<String>,
}

impl ConsulClient {
    pub async fn autopilot_get_config(&self, opts: &ReadOptions) -> Result<AutopilotConfiguration> {
        let (config, _) = self
            .get("/v1/operator/autopilot/configuration", opts, &[])
            .await?;
        Ok(config)
    }

    pub async fn autopilot_set_config(
        &self,
        config: &AutopilotConfiguration,
        opts: &WriteOptions,
    ) -> Result<()> {
        let _: Value = self
            .put("/v1/operator/autopilot/configuration", opts, config)
            .await?;
        Ok(())
    }

    pub async fn area_create(&self, area: &NetworkArea, opts: &WriteOptions) -> Result<String> {
        let created: Created = self.post("/v1/operator/area", opts, area).await?;
        Ok(created.id)
    }

    pub async fn area_read(&self, id: &str, opts: &ReadOptions) -> Result<Option<NetworkArea>> {
        let path = format!("/v1/operator/area/{}", escape(id));
        let found: Option<(Option<Vec<NetworkArea>>, _)> = self.get_optional(&path, opts, &[]).await?;
        Ok(found.and_then(|(areas, _)| areas).and_then(|a| a.into_iter().next()))
    }

    pub async fn area_update(&self, area: &NetworkArea, opts: &WriteOptions) -> Result<()> {
        let path = format!("/v1/operator/area/{}", escape(&area.id));
        let _: Value = self.put(&path, opts, area).await?;
        Ok(())
    }

    pub async fn area_delete(&self, id: &str, opts: &WriteOptions) -> Result<()> {
        self.delete(&format!("/v1/operator/area/{}", escape(id)), opts, &[])
            .await
    }

    pub async fn license_get(&self, opts: &ReadOptions) -> Result<LicenseReply> {
        let (reply, _) = self.get("/v1/operator/license", opts, &[]).await?;
        Ok(reply)
    }

    /// Install license text. The text is sent as the raw body and never logged.
    pub async fn license_put(&self, license: &WireSecret, opts: &WriteOptions) -> Result<LicenseReply> {
        let response = self
            .write_raw(
                Method::PUT,
                "/v1/operator/license",
                opts,
                &[],
                Body::Raw(license.expose().as_bytes()),
            )
            .await?;
        Ok(serde_json::from_slice(&response.body).unwrap_or_default())
    }

    pub async fn license_reset(&self, opts: &WriteOptions) -> Result<()> {
        self.delete("/v1/operator/license", opts, &[]).await
    }
}
