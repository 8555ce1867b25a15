//! Query and write options: provider defaults composed with per-object overrides.

use provider_core::utils::parse_duration;
use provider_core::{AttrRead, ProviderError, Result};
use secrecy::{ExposeSecret, Secret};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

/// Options applied to read calls.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub datacenter: Option<String>,
    pub namespace: Option<String>,
    pub partition: Option<String>,
    pub token: Option<Secret<String>>,
    pub allow_stale: bool,
    pub require_consistent: bool,
    pub near: Option<String>,
    pub node_meta: BTreeMap<String, String>,
    pub wait_index: u64,
    pub wait_time: Option<Duration>,
    pub filter: Option<String>,
}

/// Options applied to write calls.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub datacenter: Option<String>,
    pub namespace: Option<String>,
    pub partition: Option<String>,
    pub token: Option<Secret<String>>,
}

impl ReadOptions {
    /// Query parameters understood by every read endpoint.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut q = scope_pairs(&self.datacenter, &self.namespace, &self.partition);
        if self.require_consistent {
            q.push(("consistent".into(), String::new()));
        } else if self.allow_stale {
            q.push(("stale".into(), String::new()));
        }
        if let Some(near) = &self.near {
            q.push(("near".into(), near.clone()));
        }
        for (k, v) in &self.node_meta {
            q.push(("node-meta".into(), format!("{}:{}", k, v)));
        }
        if self.wait_index > 0 {
            q.push(("index".into(), self.wait_index.to_string()));
        }
        if let Some(wait) = self.wait_time {
            q.push(("wait".into(), format!("{}ms", wait.as_millis())));
        }
        if let Some(filter) = &self.filter {
            q.push(("filter".into(), filter.clone()));
        }
        q
    }

    /// The write-side view of the same scope.
    pub fn to_write(&self) -> WriteOptions {
        WriteOptions {
            datacenter: self.datacenter.clone(),
            namespace: self.namespace.clone(),
            partition: self.partition.clone(),
            token: self.token.clone(),
        }
    }
}

impl WriteOptions {
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        scope_pairs(&self.datacenter, &self.namespace, &self.partition)
    }
}

fn scope_pairs(
    datacenter: &Option<String>,
    namespace: &Option<String>,
    partition: &Option<String>,
) -> Vec<(String, String)> {
    let mut q = Vec::new();
    if let Some(dc) = datacenter {
        q.push(("dc".into(), dc.clone()));
    }
    if let Some(ns) = namespace {
        q.push(("ns".into(), ns.clone()));
    }
    if let Some(partition) = partition {
        q.push(("partition".into(), partition.clone()));
    }
    q
}

/// Provider-wide baseline taken from the provider settings.
#[derive(Debug, Clone)]
pub struct ProviderDefaults {
    pub datacenter: Option<String>,
    pub namespace: Option<String>,
    pub partition: Option<String>,
    pub token: Option<Secret<String>>,
    pub allow_stale: bool,
    pub require_consistent: bool,
    pub wait_time: Option<Duration>,
}

impl Default for ProviderDefaults {
    fn default() -> Self {
        Self {
            datacenter: None,
            namespace: None,
            partition: None,
            token: None,
            allow_stale: true,
            require_consistent: false,
            wait_time: None,
        }
    }
}

/// Per-object overrides read from the object's own attributes.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub datacenter: Option<String>,
    pub namespace: Option<String>,
    pub partition: Option<String>,
    pub token: Option<Secret<String>>,
    pub allow_stale: Option<bool>,
    pub require_consistent: Option<bool>,
    pub near: Option<String>,
    pub node_meta: BTreeMap<String, String>,
    pub wait_index: Option<u64>,
    pub wait_time: Option<Duration>,
    pub filter: Option<String>,
}

impl Overrides {
    /// Collect overrides from the well-known scope attributes (`datacenter`,
    /// `namespace`, `partition`, `token`) and an optional `query_options` block.
    /// Attributes an object does not declare simply read as unset.
    pub fn from_attrs(d: &impl AttrRead) -> Result<Self> {
        let mut o = Self {
            datacenter: d.opt_str("datacenter").map(str::to_string),
            namespace: d.opt_str("namespace").map(str::to_string),
            partition: d.opt_str("partition").map(str::to_string),
            token: d.opt_str("token").map(|t| Secret::new(t.to_string())),
            ..Default::default()
        };

        if let Some(q) = d.block("query_options") {
            if let Some(dc) = q.opt_str("datacenter") {
                o.datacenter = Some(dc.to_string());
            }
            if let Some(ns) = q.opt_str("namespace") {
                o.namespace = Some(ns.to_string());
            }
            if let Some(partition) = q.opt_str("partition") {
                o.partition = Some(partition.to_string());
            }
            if let Some(token) = q.opt_str("token") {
                o.token = Some(Secret::new(token.to_string()));
            }
            o.allow_stale = q.value("allow_stale").and_then(|v| v.as_bool());
            o.require_consistent = q.value("require_consistent").and_then(|v| v.as_bool());
            o.near = q.opt_str("near").map(str::to_string);
            o.node_meta = q.string_map("node_meta");
            o.filter = q.opt_str("filter").map(str::to_string);
            if let Some(index) = q.value("wait_index") {
                let index = index.as_i64().unwrap_or(-1);
                if index < 0 {
                    return Err(ProviderError::invalid("wait_index must be a non-negative integer"));
                }
                o.wait_index = Some(index as u64);
            }
            if let Some(wait) = q.opt_str("wait_time") {
                o.wait_time = Some(parse_duration(wait)?);
            }
        }
        Ok(o)
    }
}

/// Compose options: override > provider default > built-in default.
pub fn resolve(defaults: &ProviderDefaults, overrides: &Overrides) -> (ReadOptions, WriteOptions) {
    let pick = |o: &Option<String>, d: &Option<String>| o.clone().or_else(|| d.clone());

    let mut allow_stale = overrides.allow_stale.unwrap_or(defaults.allow_stale);
    let require_consistent = overrides
        .require_consistent
        .unwrap_or(defaults.require_consistent);
    if allow_stale && require_consistent {
        warn!("allow_stale and require_consistent are both set, using require_consistent");
        allow_stale = false;
    }

    let token = overrides
        .token
        .clone()
        .or_else(|| defaults.token.clone())
        .filter(|t| !t.expose_secret().is_empty());

    let read = ReadOptions {
        datacenter: pick(&overrides.datacenter, &defaults.datacenter),
        namespace: pick(&overrides.namespace, &defaults.namespace),
        partition: pick(&overrides.partition, &defaults.partition),
        token,
        allow_stale,
        require_consistent,
        near: overrides.near.clone(),
        node_meta: overrides.node_meta.clone(),
        wait_index: overrides.wait_index.unwrap_or(0),
        wait_time: overrides.wait_time.or(defaults.wait_time),
        filter: overrides.filter.clone(),
    };
    let write = read.to_write();
    (read, write)
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider_core::{Attribute, ErrorKind, ResourceData, Schema};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn data(v: Value) -> ResourceData {
        let query = Schema::new(0)
            .attribute("datacenter", Attribute::string().optional())
            .attribute("allow_stale", Attribute::bool().optional())
            .attribute("require_consistent", Attribute::bool().optional())
            .attribute("wait_index", Attribute::int().optional())
            .attribute("wait_time", Attribute::string().optional())
            .attribute("node_meta", Attribute::map().optional());
        let schema = Schema::new(0)
            .attribute("datacenter", Attribute::string().optional())
            .attribute("namespace", Attribute::string().optional())
            .attribute("query_options", Attribute::block_list(query).optional());
        ResourceData::from_config(Arc::new(schema), v.as_object().cloned().unwrap()).unwrap()
    }

    fn defaults() -> ProviderDefaults {
        ProviderDefaults {
            datacenter: Some("dc1".into()),
            namespace: Some("team".into()),
            token: Some(Secret::new("provider-token".into())),
            ..Default::default()
        }
    }

    #[test]
    fn test_override_beats_provider_default() {
        let o = Overrides::from_attrs(&data(json!({"datacenter": "dc2"}))).unwrap();
        let (read, write) = resolve(&defaults(), &o);
        assert_eq!(read.datacenter.as_deref(), Some("dc2"));
        assert_eq!(write.namespace.as_deref(), Some("team"));
        assert_eq!(write.token.unwrap().expose_secret(), "provider-token");
        assert!(read.allow_stale);
    }

    #[test]
    fn test_consistent_wins_over_stale() {
        let o = Overrides::from_attrs(&data(json!({
            "query_options": [{"allow_stale": true, "require_consistent": true}]
        })))
        .unwrap();
        let (read, _) = resolve(&defaults(), &o);
        assert!(read.require_consistent);
        assert!(!read.allow_stale);
        let q = read.query_pairs();
        assert!(q.contains(&("consistent".into(), String::new())));
        assert!(!q.iter().any(|(k, _)| k == "stale"));
    }

    #[test]
    fn test_blocking_parameters() {
        let o = Overrides::from_attrs(&data(json!({
            "query_options": [{"wait_index": 42, "wait_time": "1m30s", "node_meta": {"rack": "a"}}]
        })))
        .unwrap();
        let (read, _) = resolve(&ProviderDefaults::default(), &o);
        let q = read.query_pairs();
        assert!(q.contains(&("index".into(), "42".into())));
        assert!(q.contains(&("wait".into(), "90000ms".into())));
        assert!(q.contains(&("node-meta".into(), "rack:a".into())));
    }

    #[test]
    fn test_negative_wait_rejected() {
        let err = Overrides::from_attrs(&data(json!({"query_options": [{"wait_time": "-5s"}]})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        let err = Overrides::from_attrs(&data(json!({"query_options": [{"wait_index": -1}]})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }
}
