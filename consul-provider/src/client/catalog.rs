//! Catalog and health endpoints.

use super::acl::null_as_default;
use super::{escape, ConsulClient, QueryMeta};
use crate::options::{ReadOptions, WriteOptions};
use provider_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentService {
    #[serde(rename = "ID", default)]
    pub id: String,
    pub service: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: BTreeMap<String, String>,
    #[serde(default)]
    pub enable_tag_override: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthCheckDefinition {
    #[serde(rename = "HTTP", default, skip_serializing_if = "String::is_empty")]
    pub http: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", deserialize_with = "null_as_default")]
    pub header: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(rename = "TLSSkipVerify", default)]
    pub tls_skip_verify: bool,
    #[serde(rename = "TCP", default, skip_serializing_if = "String::is_empty")]
    pub tcp: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interval: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timeout: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deregister_critical_service_after: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthCheck {
    #[serde(default)]
    pub node: String,
    #[serde(rename = "CheckID")]
    pub check_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub notes: String,
    #[serde(rename = "ServiceID", default)]
    pub service_id: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default)]
    pub definition: HealthCheckDefinition,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogRegistration {
    pub node: String,
    pub address: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub datacenter: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub node_meta: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<AgentService>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<HealthCheck>,
    pub skip_node_update: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub partition: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogDeregistration {
    pub node: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub datacenter: String,
    #[serde(rename = "ServiceID", skip_serializing_if = "String::is_empty")]
    pub service_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub partition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogNode {
    #[serde(rename = "ID", default)]
    pub id: String,
    pub node: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub datacenter: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tagged_addresses: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogNodeServices {
    pub node: CatalogNode,
    #[serde(default, deserialize_with = "null_as_default")]
    pub services: BTreeMap<String, AgentService>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogService {
    #[serde(rename = "ID", default)]
    pub id: String,
    pub node: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub datacenter: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tagged_addresses: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub node_meta: BTreeMap<String, String>,
    #[serde(rename = "ServiceID", default)]
    pub service_id: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub service_address: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub service_tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub service_meta: BTreeMap<String, String>,
    #[serde(default)]
    pub service_port: u16,
    #[serde(default)]
    pub service_enable_tag_override: bool,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
}

impl ConsulClient {
    pub async fn catalog_register(&self, reg: &CatalogRegistration, opts: &WriteOptions) -> Result<()> {
        let _: Value = self.put("/v1/catalog/register", opts, reg).await?;
        Ok(())
    }

    pub async fn catalog_deregister(
        &self,
        dereg: &CatalogDeregistration,
        opts: &WriteOptions,
    ) -> Result<()> {
        let _: Value = self.put("/v1/catalog/deregister", opts, dereg).await?;
        Ok(())
    }

    /// A node and its services; `None` when the node is not registered.
    pub async fn catalog_node(&self, node: &str, opts: &ReadOptions) -> Result<Option<CatalogNodeServices>> {
        let path = format!("/v1/catalog/node/{}", escape(node));
        let found: Option<(Option<CatalogNodeServices>, _)> =
            self.get_optional(&path, opts, &[]).await?;
        Ok(found.and_then(|(node, _)| node))
    }

    pub async fn catalog_service(
        &self,
        service: &str,
        tag: Option<&str>,
        opts: &ReadOptions,
    ) -> Result<(Vec<CatalogService>, QueryMeta)> {
        let path = format!("/v1/catalog/service/{}", escape(service));
        let extra: Vec<(&str, &str)> = tag.map(|t| vec![("tag", t)]).unwrap_or_default();
        let (services, meta): (Option<Vec<CatalogService>>, _) = self.get(&path, opts, &extra).await?;
        Ok((services.unwrap_or_default(), meta))
    }

    pub async fn catalog_nodes(&self, opts: &ReadOptions) -> Result<(Vec<CatalogNode>, QueryMeta)> {
        let (nodes, meta): (Option<Vec<CatalogNode>>, _) = self.get("/v1/catalog/nodes", opts, &[]).await?;
        Ok((nodes.unwrap_or_default(), meta))
    }

    /// Service names mapped to the union of their tags.
    pub async fn catalog_services(
        &self,
        opts: &ReadOptions,
    ) -> Result<(BTreeMap<String, Vec<String>>, QueryMeta)> {
        let (services, meta): (Option<BTreeMap<String, Option<Vec<String>>>>, _) =
            self.get("/v1/catalog/services", opts, &[]).await?;
        let services = services
            .unwrap_or_default()
            .into_iter()
            .map(|(name, tags)| (name, tags.unwrap_or_default()))
            .collect();
        Ok((services, meta))
    }

    pub async fn catalog_datacenters(&self) -> Result<Vec<String>> {
        let (dcs, _): (Option<Vec<String>>, _) = self
            .get("/v1/catalog/datacenters", &ReadOptions::default(), &[])
            .await?;
        Ok(dcs.unwrap_or_default())
    }

    pub async fn health_node_checks(&self, node: &str, opts: &ReadOptions) -> Result<Vec<HealthCheck>> {
        let path = format!("/v1/health/node/{}", escape(node));
        let (checks, _): (Option<Vec<HealthCheck>>, _) = self.get(&path, opts, &[]).await?;
        Ok(checks.unwrap_or_default())
    }
}
