use super::{namespace_attr, parse_json_object, partition_attr};
use crate::client::config_entry::{payload_of, ConfigEntry};
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::ids::{decode_path, encode_path};
use provider_core::schema::{canonical_json, is_empty_value};
use provider_core::{AttrRead, Attribute, ProviderError, Resource, ResourceData, Result, Schema};
use serde_json::Value;
use tracing::info;

pub struct ConfigEntryResource;

/// Fields the server adds to every entry.
const SERVER_FIELDS: [&str; 2] = ["CreateIndex", "ModifyIndex"];

/// Drop zero values at every depth; the server fills in empty blocks.
fn prune(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.values_mut().for_each(prune);
            map.retain(|_, v| !is_empty_value(v));
        }
        Value::Array(items) => items.iter_mut().for_each(prune),
        _ => {}
    }
}

/// Equal when both documents match once server-maintained fields and
/// server-supplied empty blocks are dropped.
fn config_equivalent(old: &Value, new: &Value) -> bool {
    let strip = |v: &Value| -> Option<String> {
        let mut doc: Value = serde_json::from_str(v.as_str()?).ok()?;
        if let Value::Object(map) = &mut doc {
            for field in SERVER_FIELDS {
                map.remove(field);
            }
        }
        prune(&mut doc);
        Some(canonical_json(&doc))
    };
    match (strip(old), strip(new)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// `<kind>/<name>`, prefixed by the namespace and partition when they are set.
pub(crate) fn entry_id(kind: &str, name: &str, namespace: &str, partition: &str) -> String {
    match (namespace, partition) {
        ("", "") => encode_path(&[kind, name]),
        (ns, "") => encode_path(&[ns, kind, name]),
        (ns, partition) => encode_path(&[partition, ns, kind, name]),
    }
}

/// Inverse of [`entry_id`]: `(partition, namespace, kind, name)`.
pub(crate) fn parse_entry_id(id: &str) -> Result<(String, String, String, String)> {
    let mut parts = decode_path(id, &[2, 3, 4], &[1])?;
    let name = parts.pop().unwrap_or_default();
    let kind = parts.pop().unwrap_or_default();
    if kind.is_empty() || name.is_empty() {
        return Err(ProviderError::invalid(format!(
            "unexpected ID format ({:?}), kind and name must not be empty",
            id
        )));
    }
    let namespace = parts.pop().unwrap_or_default();
    let partition = parts.pop().unwrap_or_default();
    Ok((partition, namespace, kind, name))
}

fn payload_from(d: &ResourceData) -> Result<serde_json::Map<String, Value>> {
    let mut payload = match d.opt_str("config_json") {
        Some(text) => parse_json_object("config_json", text)?,
        None => serde_json::Map::new(),
    };
    for field in SERVER_FIELDS {
        payload.remove(field);
    }
    ConfigEntry::parse(d.str("kind"), d.str("name"), &payload)?;
    Ok(payload)
}

#[async_trait]
impl Resource<ConsulContext> for ConfigEntryResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute(
                "kind",
                Attribute::string()
                    .required()
                    .force_new()
                    .description("The kind of entry, e.g. service-defaults."),
            )
            .attribute("name", Attribute::string().required().force_new())
            .attribute("namespace", namespace_attr())
            .attribute("partition", partition_attr())
            .attribute(
                "config_json",
                Attribute::string()
                    .optional()
                    .suppress_diff(config_equivalent)
                    .description("The entry payload as JSON, without Kind, Name, Namespace or Partition."),
            )
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let payload = payload_from(d)?;
        let (kind, name) = (d.string("kind"), d.string("name"));
        ctx.client.config_entry_set(&kind, &name, &payload, &write).await?;
        info!(kind = %kind, name = %name, "Config entry written");

        let id = entry_id(&kind, &name, d.str("namespace"), d.str("partition"));
        d.set_id(id);
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let Some(document) = ctx
            .client
            .config_entry_get(d.str("kind"), d.str("name"), &read)
            .await?
        else {
            d.clear_id();
            return Ok(());
        };

        let kind = document.get("Kind").and_then(Value::as_str).unwrap_or(d.str("kind")).to_string();
        let name = document.get("Name").and_then(Value::as_str).unwrap_or(d.str("name")).to_string();
        let payload = payload_of(document);
        let mut w = d.writer();
        w.set("kind", &kind)
            .set("name", &name)
            .set_json("config_json", &payload);
        w.finish()
    }

    /// Entries are upserted, so an update is the same call as a create.
    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let payload = payload_from(d)?;
        ctx.client
            .config_entry_set(d.str("kind"), d.str("name"), &payload, &write)
            .await?;
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client
            .config_entry_delete(d.str("kind"), d.str("name"), &write)
            .await?;
        d.clear_id();
        Ok(())
    }

    fn importable(&self) -> bool {
        true
    }

    async fn import(&self, _ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (partition, namespace, kind, name) = parse_entry_id(d.id())?;
        let mut w = d.writer();
        w.set("kind", &kind).set("name", &name);
        if !namespace.is_empty() {
            w.set("namespace", &namespace);
        }
        if !partition.is_empty() {
            w.set("partition", &partition);
        }
        w.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_id_forms() {
        assert_eq!(entry_id("service-defaults", "web", "", ""), "service-defaults/web");
        assert_eq!(entry_id("service-defaults", "web", "team", ""), "team/service-defaults/web");
        assert_eq!(entry_id("service-defaults", "web", "", "p1"), "p1//service-defaults/web");

        let (partition, namespace, kind, name) = parse_entry_id("p1//service-defaults/web").unwrap();
        assert_eq!((partition.as_str(), namespace.as_str()), ("p1", ""));
        assert_eq!((kind.as_str(), name.as_str()), ("service-defaults", "web"));

        assert!(parse_entry_id("service-defaults").is_err());
        assert!(parse_entry_id("a/b/c/d/e").is_err());
        assert!(parse_entry_id("/web").is_err());
        assert!(parse_entry_id("service-defaults/").is_err());
        assert!(parse_entry_id("team//web").is_err());
    }

    #[test]
    fn test_config_equivalent_ignores_indexes() {
        assert!(config_equivalent(
            &json!(r#"{"Protocol":"http","CreateIndex":12,"ModifyIndex":15}"#),
            &json!(r#"{"Protocol": "http"}"#)
        ));
        assert!(!config_equivalent(
            &json!(r#"{"Protocol":"http","CreateIndex":12}"#),
            &json!(r#"{"Protocol": "tcp"}"#)
        ));
    }

    #[test]
    fn test_config_equivalent_ignores_server_filled_empty_blocks() {
        let observed = json!(
            r#"{"Protocol":"http","TransparentProxy":{},"MeshGateway":{"Mode":""},"Expose":{"Paths":[]},"CreateIndex":12,"ModifyIndex":12}"#
        );
        assert!(config_equivalent(&observed, &json!(r#"{"Protocol":"http"}"#)));
        assert!(!config_equivalent(
            &observed,
            &json!(r#"{"Protocol":"http","MeshGateway":{"Mode":"local"}}"#)
        ));
    }
}
