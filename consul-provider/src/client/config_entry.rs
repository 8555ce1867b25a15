//! Configuration entries: polymorphic documents keyed by `(kind, name)`.
//!
//! Payloads travel as opaque JSON objects so new kinds need no code change.
//! `service-defaults` and `proxy-defaults` additionally decode into typed
//! variants, which is how their shape gets checked before a write.

use super::{escape, ConsulClient};
use crate::options::{ReadOptions, WriteOptions};
use once_cell::sync::Lazy;
use provider_core::{ProviderError, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const SERVICE_DEFAULTS: &str = "service-defaults";
pub const PROXY_DEFAULTS: &str = "proxy-defaults";

/// Fields owned by the entry's identity rather than its payload.
pub const IDENTITY_FIELDS: [&str; 4] = ["Kind", "Name", "Namespace", "Partition"];

static KIND_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z-]*$").expect("valid kind regex"));

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MeshGatewayConfig {
    #[serde(default)]
    pub mode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceDefaults {
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub mesh_gateway: MeshGatewayConfig,
    #[serde(default)]
    pub external_sni: String,
    #[serde(default)]
    pub max_inbound_connections: u64,
    #[serde(default)]
    pub local_connect_timeout_ms: u64,
    #[serde(default)]
    pub local_request_timeout_ms: u64,
    #[serde(default)]
    pub balance_inbound_connections: String,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProxyDefaults {
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub mesh_gateway: MeshGatewayConfig,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A configuration entry payload, typed where the kind is known.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigEntry {
    ServiceDefaults(Box<ServiceDefaults>),
    ProxyDefaults(Box<ProxyDefaults>),
    Other { kind: String },
}

impl ConfigEntry {
    /// Decode and check a payload for `kind`/`name`.
    pub fn parse(kind: &str, name: &str, payload: &Map<String, Value>) -> Result<Self> {
        validate_kind(kind)?;
        let entry = match kind {
            SERVICE_DEFAULTS => {
                let typed: ServiceDefaults = serde_json::from_value(Value::Object(payload.clone()))
                    .map_err(|e| ProviderError::invalid(format!("{} payload: {}", kind, e)))?;
                one_of("Protocol", &typed.protocol, &["", "tcp", "http", "http2", "grpc"])?;
                one_of("Mode", &typed.mode, &["", "direct", "transparent"])?;
                one_of("MeshGateway.Mode", &typed.mesh_gateway.mode, &["", "none", "local", "remote"])?;
                ConfigEntry::ServiceDefaults(Box::new(typed))
            }
            PROXY_DEFAULTS => {
                if name != "global" {
                    return Err(ProviderError::invalid(format!(
                        "{} entries must be named \"global\", got {:?}",
                        kind, name
                    )));
                }
                let typed: ProxyDefaults = serde_json::from_value(Value::Object(payload.clone()))
                    .map_err(|e| ProviderError::invalid(format!("{} payload: {}", kind, e)))?;
                one_of("Mode", &typed.mode, &["", "direct", "transparent"])?;
                one_of("MeshGateway.Mode", &typed.mesh_gateway.mode, &["", "none", "local", "remote"])?;
                ConfigEntry::ProxyDefaults(Box::new(typed))
            }
            other => ConfigEntry::Other {
                kind: other.to_string(),
            },
        };
        for field in IDENTITY_FIELDS {
            if payload.contains_key(field) {
                return Err(ProviderError::invalid(format!(
                    "config_json must not contain {:?}; it is set from the resource attributes",
                    field
                )));
            }
        }
        Ok(entry)
    }

    pub fn kind(&self) -> &str {
        match self {
            ConfigEntry::ServiceDefaults(_) => SERVICE_DEFAULTS,
            ConfigEntry::ProxyDefaults(_) => PROXY_DEFAULTS,
            ConfigEntry::Other { kind } => kind,
        }
    }
}

pub fn validate_kind(kind: &str) -> Result<()> {
    if KIND_RE.is_match(kind) {
        Ok(())
    } else {
        Err(ProviderError::invalid(format!(
            "{:?} is not a valid config entry kind",
            kind
        )))
    }
}

fn one_of(field: &str, value: &str, allowed: &[&str]) -> Result<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ProviderError::invalid(format!(
            "{}: {:?} is not one of {:?}",
            field, value, allowed
        )))
    }
}

/// Split a server document into its payload, dropping identity fields.
pub fn payload_of(mut document: Map<String, Value>) -> Map<String, Value> {
    for field in IDENTITY_FIELDS {
        document.remove(field);
    }
    document
}

impl ConsulClient {
    pub async fn config_entry_set(
        &self,
        kind: &str,
        name: &str,
        payload: &Map<String, Value>,
        opts: &WriteOptions,
    ) -> Result<()> {
        let mut document = payload.clone();
        document.insert("Kind".into(), Value::String(kind.to_string()));
        document.insert("Name".into(), Value::String(name.to_string()));
        if let Some(ns) = &opts.namespace {
            document.insert("Namespace".into(), Value::String(ns.clone()));
        }
        if let Some(partition) = &opts.partition {
            document.insert("Partition".into(), Value::String(partition.clone()));
        }
        let accepted: bool = self.put("/v1/config", opts, &document).await?;
        if !accepted {
            return Err(ProviderError::conflict(format!(
                "config entry {}/{} was not written",
                kind, name
            )));
        }
        Ok(())
    }

    pub async fn config_entry_get(
        &self,
        kind: &str,
        name: &str,
        opts: &ReadOptions,
    ) -> Result<Option<Map<String, Value>>> {
        let path = format!("/v1/config/{}/{}", escape(kind), escape(name));
        Ok(self.get_optional(&path, opts, &[]).await?.map(|(doc, _)| doc))
    }

    pub async fn config_entry_delete(&self, kind: &str, name: &str, opts: &WriteOptions) -> Result<()> {
        let path = format!("/v1/config/{}/{}", escape(kind), escape(name));
        self.delete(&path, opts, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider_core::ErrorKind;
    use serde_json::json;

    fn payload(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_typed_service_defaults() {
        let entry =
            ConfigEntry::parse(SERVICE_DEFAULTS, "web", &payload(json!({"Protocol": "http"}))).unwrap();
        match entry {
            ConfigEntry::ServiceDefaults(sd) => assert_eq!(sd.protocol, "http"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_payloads() {
        let cases = [
            (SERVICE_DEFAULTS, "web", json!({"Protocol": "smtp"})),
            (SERVICE_DEFAULTS, "web", json!({"Protocol": 5})),
            (PROXY_DEFAULTS, "web", json!({})),
            ("Bad_Kind", "web", json!({})),
            ("service-router", "web", json!({"Name": "other"})),
        ];
        for (kind, name, body) in cases {
            let err = ConfigEntry::parse(kind, name, &payload(body)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Invalid, "{} {}", kind, name);
        }
    }

    #[test]
    fn test_unknown_kind_passes_through() {
        let entry =
            ConfigEntry::parse("service-router", "web", &payload(json!({"Routes": []}))).unwrap();
        assert_eq!(entry.kind(), "service-router");
    }

    #[test]
    fn test_payload_strips_identity() {
        let doc = payload(json!({"Kind": "service-defaults", "Name": "web", "Protocol": "http", "CreateIndex": 7}));
        assert_eq!(payload_of(doc), payload(json!({"Protocol": "http", "CreateIndex": 7})));
    }
}
