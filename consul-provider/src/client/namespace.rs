use super::acl::{null_as_default, AclLink};
use super::{escape, ConsulClient};
use crate::options::{ReadOptions, WriteOptions};
use provider_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NamespaceAcls {
    #[serde(default, deserialize_with = "null_as_default")]
    pub policy_defaults: Vec<AclLink>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role_defaults: Vec<AclLink>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Namespace {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "ACLs", default)]
    pub acls: NamespaceAcls,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    #[serde(default, skip_serializing)]
    pub deleted_at: Option<String>,
    #[serde(default, skip_serializing)]
    pub modify_index: u64,
}

impl ConsulClient {
    pub async fn namespace_create(&self, ns: &Namespace, opts: &WriteOptions) -> Result<Namespace> {
        self.put("/v1/namespace", opts, ns).await
    }

    /// A namespace marked for deletion counts as absent.
    pub async fn namespace_read(&self, name: &str, opts: &ReadOptions) -> Result<Option<Namespace>> {
        let path = format!("/v1/namespace/{}", escape(name));
        let found: Option<(Option<Namespace>, _)> = self.get_optional(&path, opts, &[]).await?;
        Ok(found
            .and_then(|(ns, _)| ns)
            .filter(|ns| ns.deleted_at.is_none()))
    }

    pub async fn namespace_update(&self, ns: &Namespace, opts: &WriteOptions) -> Result<Namespace> {
        let path = format!("/v1/namespace/{}", escape(&ns.name));
        self.put(&path, opts, ns).await
    }

    pub async fn namespace_delete(&self, name: &str, opts: &WriteOptions) -> Result<()> {
        self.delete(&format!("/v1/namespace/{}", escape(name)), opts, &[])
            .await
    }
}
