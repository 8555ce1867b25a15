use super::acl::null_as_default;
use super::{escape, ConsulClient, WireSecret};
use crate::options::{ReadOptions, WriteOptions};
use provider_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GenerateTokenRequest {
    pub peer_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub partition: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub server_external_addresses: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GenerateTokenResponse {
    peering_token: WireSecret,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EstablishRequest {
    pub peer_name: String,
    pub peering_token: WireSecret,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub partition: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PeeringStreamStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub imported_services: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub exported_services: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Peering {
    #[serde(rename = "ID", default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub partition: String,
    #[serde(default)]
    pub deleted_at: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: BTreeMap<String, String>,
    #[serde(default)]
    pub state: String,
    #[serde(rename = "PeerID", default)]
    pub peer_id: String,
    #[serde(rename = "PeerCAPems", default, deserialize_with = "null_as_default")]
    pub peer_ca_pems: Vec<String>,
    #[serde(default)]
    pub peer_server_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub peer_server_addresses: Vec<String>,
    #[serde(default)]
    pub stream_status: PeeringStreamStatus,
}

impl ConsulClient {
    /// Generate a peering token. The token is returned wrapped and never logged.
    pub async fn peering_generate_token(
        &self,
        request: &GenerateTokenRequest,
        opts: &WriteOptions,
    ) -> Result<WireSecret> {
        let response: GenerateTokenResponse = self.post("/v1/peering/token", opts, request).await?;
        Ok(response.peering_token)
    }

    pub async fn peering_establish(&self, request: &EstablishRequest, opts: &WriteOptions) -> Result<()> {
        let _: Value = self.post("/v1/peering/establish", opts, request).await?;
        Ok(())
    }

    /// A peering being torn down counts as absent.
    pub async fn peering_read(&self, name: &str, opts: &ReadOptions) -> Result<Option<Peering>> {
        let path = format!("/v1/peering/{}", escape(name));
        let found: Option<(Option<Peering>, _)> = self.get_optional(&path, opts, &[]).await?;
        Ok(found
            .and_then(|(p, _)| p)
            .filter(|p| p.deleted_at.is_none()))
    }

    pub async fn peering_delete(&self, name: &str, opts: &WriteOptions) -> Result<()> {
        self.delete(&format!("/v1/peering/{}", escape(name)), opts, &[])
            .await
    }
}
