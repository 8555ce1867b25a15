//! Individually managed KV entries.
//!
//! Each `key` block names one path. A block with a `name` and no `value` is
//! read-only: its value (or `default`) is exported through `var` and nothing
//! is written. Writes are applied before deletes, so a renamed key is never
//! momentarily absent.

use super::{datacenter_attr, namespace_attr, partition_attr, token_attr};
use crate::context::ConsulContext;
use crate::kv::KeyClient;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, Block, ProviderError, Resource, ResourceData, Result, Schema};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub const KEYS_ID: &str = "consul";

pub struct KeysResource;

pub(crate) fn key_schema() -> Schema {
    Schema::new(0)
        .attribute(
            "name",
            Attribute::string()
                .optional()
                .deprecated("read values with the consul_keys data source instead"),
        )
        .attribute("path", Attribute::string().required())
        .attribute("value", Attribute::string().optional())
        .attribute("flags", Attribute::int().optional().default(0))
        .attribute("default", Attribute::string().optional())
        .attribute(
            "delete",
            Attribute::bool()
                .optional()
                .default(false)
                .description("Remove the key when the resource is destroyed."),
        )
        .attribute(
            "cas",
            Attribute::int()
                .optional()
                .default(-1)
                .description("Write with check-and-set against this index; negative disables it."),
        )
}

/// One `key` block.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct KeySpec {
    pub name: String,
    pub path: String,
    pub value: String,
    pub flags: u64,
    pub default: Option<String>,
    pub delete: bool,
    pub cas: Option<u64>,
}

impl KeySpec {
    pub fn from_block(b: &Block<'_>) -> Result<Self> {
        let flags = b.int("flags");
        let flags = u64::try_from(flags)
            .map_err(|_| ProviderError::invalid(format!("key {:?}: flags must be non-negative", b.str("path"))))?;
        Ok(Self {
            name: b.string("name"),
            path: b.string("path"),
            value: b.string("value"),
            flags,
            default: b.opt_str("default").map(str::to_string),
            delete: b.bool("delete"),
            cas: u64::try_from(b.int("cas")).ok(),
        })
    }

    pub fn is_read_only(&self) -> bool {
        !self.name.is_empty() && self.value.is_empty()
    }
}

fn specs(blocks: Vec<Block<'_>>) -> Result<Vec<KeySpec>> {
    blocks.iter().map(KeySpec::from_block).collect()
}

impl KeysResource {
    async fn write_all(keys: &KeyClient<'_>, specs: &[KeySpec]) -> Result<()> {
        for spec in specs.iter().filter(|s| !s.is_read_only()) {
            match spec.cas {
                Some(index) => keys.cas(&spec.path, &spec.value, spec.flags, index).await?,
                None => keys.put(&spec.path, &spec.value, spec.flags).await?,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Resource<ConsulContext> for KeysResource {
    fn schema(&self) -> Schema {
        Schema::new(1)
            .attribute("datacenter", datacenter_attr())
            .attribute("token", token_attr())
            .attribute("key", Attribute::block_set(key_schema()).optional())
            .attribute(
                "var",
                Attribute::map()
                    .computed()
                    .description("Values of the read-only keys, by name."),
            )
            .attribute("namespace", namespace_attr())
            .attribute("partition", partition_attr())
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, write) = ctx.options(d)?;
        let datacenter = ctx.datacenter(d).await?;
        let wanted = specs(d.blocks("key"))?;

        Self::write_all(&ctx.keys(read, write), &wanted).await?;

        let mut w = d.writer();
        w.set("datacenter", &datacenter);
        w.finish()?;
        d.set_id(KEYS_ID);
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, write) = ctx.options(d)?;
        let keys = ctx.keys(read, write);
        let configured = specs(d.blocks("key"))?;

        let mut vars = BTreeMap::new();
        let mut observed = Vec::with_capacity(configured.len());
        for spec in &configured {
            let found = keys.get(&spec.path).await?;
            let value = match (found.exists, &spec.default) {
                (true, _) => found.value.clone(),
                (false, Some(default)) => default.clone(),
                (false, None) => String::new(),
            };
            if !spec.name.is_empty() {
                vars.insert(spec.name.clone(), value);
            }

            let (value, flags) = if spec.is_read_only() {
                (spec.value.clone(), spec.flags)
            } else if found.exists {
                (found.value, found.flags)
            } else {
                debug!(path = %spec.path, "Managed key is missing");
                (String::new(), spec.flags)
            };
            observed.push(json!({
                "name": spec.name,
                "path": spec.path,
                "value": value,
                "flags": flags,
                "default": spec.default,
                "delete": spec.delete,
                "cas": spec.cas.map_or(-1, |c| c as i64),
            }));
        }

        let mut w = d.writer();
        w.set("key", &observed).set("var", &vars);
        w.finish()
    }

    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, write) = ctx.options(d)?;
        let keys = ctx.keys(read, write);
        let wanted = specs(d.blocks("key"))?;
        let previous = specs(d.prior().blocks("key"))?;

        Self::write_all(&keys, &wanted).await?;

        let kept: BTreeSet<&str> = wanted.iter().map(|s| s.path.as_str()).collect();
        for old in previous.iter().filter(|s| s.delete && !kept.contains(s.path.as_str())) {
            keys.delete(&old.path).await?;
        }
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, write) = ctx.options(d)?;
        let keys = ctx.keys(read, write);
        for spec in specs(d.blocks("key"))?.iter().filter(|s| s.delete) {
            keys.delete(&spec.path).await?;
        }
        d.clear_id();
        Ok(())
    }

    fn migrate_state(&self, from_version: u32, attributes: Map<String, Value>) -> Result<Map<String, Value>> {
        match from_version {
            0 => migrate_flatmap(attributes),
            _ => Ok(attributes),
        }
    }
}

/// Convert the version-0 flattened encoding (`key.#`, `key.<hash>.<field>`,
/// `var.%`, `var.<name>`) into nested blocks. Block order is irrelevant: the
/// set is re-hashed when the state is normalized.
fn migrate_flatmap(attributes: Map<String, Value>) -> Result<Map<String, Value>> {
    let mut blocks: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
    let mut vars = Map::new();
    let mut out = Map::new();

    for (name, value) in attributes {
        if let Some(rest) = name.strip_prefix("key.") {
            if rest == "#" {
                continue;
            }
            let (hash, field) = rest.split_once('.').ok_or_else(|| {
                ProviderError::invalid(format!("unexpected legacy key attribute {:?}", name))
            })?;
            blocks
                .entry(hash.to_string())
                .or_default()
                .insert(field.to_string(), legacy_field(field, value)?);
        } else if let Some(var) = name.strip_prefix("var.") {
            if var != "%" {
                vars.insert(var.to_string(), value);
            }
        } else {
            out.insert(name, value);
        }
    }

    let blocks: Vec<Value> = blocks.into_values().map(Value::Object).collect();
    out.insert("key".to_string(), Value::Array(blocks));
    out.insert("var".to_string(), Value::Object(vars));
    Ok(out)
}

/// Flattened state stored every scalar as a string.
fn legacy_field(field: &str, value: Value) -> Result<Value> {
    let text = match &value {
        Value::String(s) => s.as_str(),
        _ => return Ok(value),
    };
    let invalid = || ProviderError::invalid(format!("legacy key field {}: {:?} is not valid", field, text));
    Ok(match field {
        "flags" | "cas" => json!(text.parse::<i64>().map_err(|_| invalid())?),
        "delete" => json!(text.parse::<bool>().map_err(|_| invalid())?),
        _ => value,
    })
}
