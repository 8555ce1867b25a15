//! One handler per managed Consul object kind.

pub mod acl_agent_token;
pub mod acl_auth_method;
pub mod acl_binding_rule;
pub mod acl_bootstrap_token;
pub mod acl_policy;
pub mod acl_role;
pub mod acl_token;
pub mod admin_partition;
pub mod attachment;
pub mod autopilot_config;
pub mod certificate_authority;
pub mod config_entry;
pub mod intention;
pub mod key_prefix;
pub mod keys;
pub mod license;
pub mod namespace;
pub mod network_area;
pub mod node;
pub mod peering;
pub mod peering_token;
pub mod prepared_query;
pub mod service;

use provider_core::schema::canonical_json;
use provider_core::{AttrRead, Attribute, ProviderError, Result};
use serde_json::{Map, Value};

pub(crate) fn datacenter_attr() -> Attribute {
    Attribute::string()
        .optional()
        .computed()
        .force_new()
        .description("Datacenter to use. Defaults to the provider datacenter, then the agent's.")
}

pub(crate) fn namespace_attr() -> Attribute {
    Attribute::string()
        .optional()
        .force_new()
        .description("Namespace to create the object within (Enterprise).")
}

pub(crate) fn partition_attr() -> Attribute {
    Attribute::string()
        .optional()
        .force_new()
        .description("Admin partition to create the object within (Enterprise).")
}

/// Per-object ACL token override, kept for older configurations.
pub(crate) fn token_attr() -> Attribute {
    Attribute::string()
        .optional()
        .sensitive()
        .deprecated("set the token in the provider block instead")
}

/// Server-reported namespace or partition, normalized so the implicit
/// `default` does not show up as drift against an unset attribute.
pub(crate) fn observed_scope(d: &impl AttrRead, key: &str, server: &str) -> String {
    match (d.str(key), server) {
        (configured, "default") if configured.is_empty() => String::new(),
        (configured, "") => configured.to_string(),
        (_, server) => server.to_string(),
    }
}

/// Parse a JSON-object attribute.
pub(crate) fn parse_json_object(key: &str, text: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ProviderError::invalid(format!("{}: expected a JSON object", key))),
        Err(e) => Err(ProviderError::invalid(format!("{}: invalid JSON: {}", key, e))),
    }
}

/// Diff suppression for JSON text: equal when both parse to the same document.
pub(crate) fn json_equivalent(old: &Value, new: &Value) -> bool {
    match (old.as_str(), new.as_str()) {
        (Some(a), Some(b)) => match (
            serde_json::from_str::<Value>(a),
            serde_json::from_str::<Value>(b),
        ) {
            (Ok(a), Ok(b)) => canonical_json(&a) == canonical_json(&b),
            _ => false,
        },
        _ => false,
    }
}

/// Whitespace-insensitive comparison for rule bodies.
pub(crate) fn trimmed_equal(old: &Value, new: &Value) -> bool {
    match (old.as_str(), new.as_str()) {
        (Some(a), Some(b)) => a.trim() == b.trim(),
        _ => false,
    }
}
