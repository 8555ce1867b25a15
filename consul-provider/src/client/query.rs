use super::acl::null_as_default;
use super::{escape, ConsulClient};
use crate::options::{ReadOptions, WriteOptions};
use provider_core::{ProviderError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryFailover {
    #[serde(default)]
    pub nearest_n: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub datacenters: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryService {
    pub service: String,
    #[serde(default)]
    pub failover: QueryFailover,
    #[serde(default)]
    pub only_passing: bool,
    #[serde(rename = "IgnoreCheckIDs", default, deserialize_with = "null_as_default")]
    pub ignore_check_ids: Vec<String>,
    #[serde(default)]
    pub near: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub node_meta: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub service_meta: BTreeMap<String, String>,
    #[serde(default)]
    pub connect: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDns {
    #[serde(rename = "TTL", default)]
    pub ttl: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryTemplate {
    #[serde(rename = "Type", default)]
    pub template_type: String,
    #[serde(default)]
    pub regexp: String,
    #[serde(default)]
    pub remove_empty_tags: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PreparedQuery {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub template: QueryTemplate,
    pub service: QueryService,
    #[serde(rename = "DNS", default)]
    pub dns: QueryDns,
}

#[derive(Debug, Deserialize)]
struct Created {
    #[serde(rename = "ID")]
    id: String,
}

impl ConsulClient {
    pub async fn query_create(&self, query: &PreparedQuery, opts: &WriteOptions) -> Result<String> {
        let created: Created = self.post("/v1/query", opts, query).await?;
        Ok(created.id)
    }

    /// Fetch one prepared query. The endpoint answers with a list, which must
    /// hold exactly one definition.
    pub async fn query_read(&self, id: &str, opts: &ReadOptions) -> Result<Option<PreparedQuery>> {
        let path = format!("/v1/query/{}", escape(id));
        let found: Option<(Option<Vec<PreparedQuery>>, _)> = self.get_optional(&path, opts, &[]).await?;
        let Some(mut queries) = found.and_then(|(q, _)| q) else {
            return Ok(None);
        };
        match queries.len() {
            0 => Ok(None),
            1 => Ok(queries.pop()),
            n => Err(ProviderError::internal(format!(
                "prepared query lookup for {:?} returned {} results, expected 1",
                id, n
            ))),
        }
    }

    pub async fn query_update(&self, query: &PreparedQuery, opts: &WriteOptions) -> Result<()> {
        let path = format!("/v1/query/{}", escape(&query.id));
        let _: Value = self.put(&path, opts, query).await?;
        Ok(())
    }

    pub async fn query_delete(&self, id: &str, opts: &WriteOptions) -> Result<()> {
        self.delete(&format!("/v1/query/{}", escape(id)), opts, &[])
            .await
    }
}
