//! Exclusive ownership of every key under a path prefix.

use super::{datacenter_attr, namespace_attr, partition_attr, token_attr};
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, ProviderError, Resource, ResourceData, Result, Schema};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

pub struct KeyPrefixResource;

pub(crate) fn subkey_schema() -> Schema {
    Schema::new(0)
        .attribute("path", Attribute::string().required())
        .attribute("value", Attribute::string().required())
        .attribute("flags", Attribute::int().optional().default(0))
}

/// Desired `(value, flags)` per relative path, from both `subkeys` and `subkey`.
fn entries(d: &impl AttrRead) -> Result<BTreeMap<String, (String, u64)>> {
    let mut out: BTreeMap<String, (String, u64)> = d
        .string_map("subkeys")
        .into_iter()
        .map(|(path, value)| (path, (value, 0)))
        .collect();
    for block in d.blocks("subkey") {
        let path = block.string("path");
        let flags = u64::try_from(block.int("flags"))
            .map_err(|_| ProviderError::invalid(format!("subkey {:?}: flags must be non-negative", path)))?;
        if out.insert(path.clone(), (block.string("value"), flags)).is_some() {
            return Err(ProviderError::invalid(format!(
                "subkey {:?} is declared in both subkeys and subkey",
                path
            )));
        }
    }
    Ok(out)
}

#[async_trait]
impl Resource<ConsulContext> for KeyPrefixResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute(
                "path_prefix",
                Attribute::string()
                    .required()
                    .force_new()
                    .description("Common prefix of every managed key, usually ending with a slash."),
            )
            .attribute("datacenter", datacenter_attr())
            .attribute("token", token_attr())
            .attribute("subkeys", Attribute::map().optional())
            .attribute("subkey", Attribute::block_set(subkey_schema()).optional())
            .attribute("namespace", namespace_attr())
            .attribute("partition", partition_attr())
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, write) = ctx.options(d)?;
        let datacenter = ctx.datacenter(d).await?;
        let prefix = d.string("path_prefix");
        let wanted = entries(d)?;
        let keys = ctx.keys(read, write);

        let existing = keys.list(&prefix).await?;
        if !existing.is_empty() {
            return Err(ProviderError::conflict(format!(
                "{} keys already exist under {:?}; delete them before managing this prefix",
                existing.len(),
                prefix
            )));
        }

        // From here on a failure leaves a recoverable partial object.
        let mut w = d.writer();
        w.set("datacenter", &datacenter);
        w.finish()?;
        d.set_id(prefix.clone());
        d.set_partial(true);
        for (path, (value, flags)) in &wanted {
            keys.put(&format!("{}{}", prefix, path), value, *flags).await?;
        }
        d.set_partial(false);
        info!(prefix = %prefix, keys = wanted.len(), "Key prefix claimed");

        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, write) = ctx.options(d)?;
        let prefix = d.id().to_string();
        let explicit: BTreeSet<String> = d.blocks("subkey").iter().map(|b| b.string("path")).collect();
        let pairs = ctx.keys(read, write).list(&prefix).await?;

        let mut subkeys = BTreeMap::new();
        let mut subkey: Vec<Value> = Vec::new();
        for pair in pairs {
            let Some(path) = pair.key.strip_prefix(prefix.as_str()) else {
                continue;
            };
            if path.is_empty() {
                continue;
            }
            if explicit.contains(path) {
                subkey.push(json!({"path": path, "value": pair.value_string(), "flags": pair.flags}));
            } else {
                subkeys.insert(path.to_string(), pair.value_string());
            }
        }

        let mut w = d.writer();
        w.set("path_prefix", &prefix)
            .set("subkeys", &subkeys)
            .set("subkey", &subkey);
        w.finish()
    }

    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, write) = ctx.options(d)?;
        let prefix = d.id().to_string();
        let wanted = entries(d)?;
        let previous = entries(&d.prior())?;
        let keys = ctx.keys(read, write);

        for (path, entry) in &wanted {
            if previous.get(path) != Some(entry) {
                keys.put(&format!("{}{}", prefix, path), &entry.0, entry.1).await?;
            }
        }
        for path in previous.keys().filter(|p| !wanted.contains_key(*p)) {
            keys.delete(&format!("{}{}", prefix, path)).await?;
        }
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, write) = ctx.options(d)?;
        ctx.keys(read, write).delete_tree(d.id()).await?;
        d.clear_id();
        Ok(())
    }

    fn importable(&self) -> bool {
        true
    }
}
