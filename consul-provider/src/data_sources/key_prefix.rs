use super::datacenter_attr;
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, DataSource, ResourceData, Result, Schema};
use std::collections::BTreeMap;

pub struct KeyPrefixDataSource;

fn subkey_schema() -> Schema {
    Schema::new(0)
        .attribute("name", Attribute::string().required())
        .attribute("path", Attribute::string().required())
        .attribute("default", Attribute::string().optional())
}

#[async_trait]
impl DataSource<ConsulContext> for KeyPrefixDataSource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("path_prefix", Attribute::string().required())
            .attribute("datacenter", datacenter_attr())
            .attribute("token", Attribute::string().optional().sensitive())
            .attribute("namespace", Attribute::string().optional())
            .attribute("partition", Attribute::string().optional())
            .attribute(
                "subkey",
                Attribute::block_set(subkey_schema())
                    .optional()
                    .description("Keys under the prefix to export through var, by name."),
            )
            .attribute("subkeys", Attribute::map().computed())
            .attribute("var", Attribute::map().computed())
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, write) = ctx.options(d)?;
        let datacenter = ctx.datacenter(d).await?;
        let prefix = d.string("path_prefix");
        let pairs = ctx.keys(read, write).list(&prefix).await?;

        let subkeys: BTreeMap<String, String> = pairs
            .iter()
            .filter_map(|pair| {
                let relative = pair.key.strip_prefix(prefix.as_str())?;
                Some((relative.to_string(), pair.value_string()))
            })
            .collect();

        let vars: BTreeMap<String, String> = d
            .blocks("subkey")
            .iter()
            .map(|block| {
                let value = subkeys
                    .get(block.str("path"))
                    .cloned()
                    .or_else(|| block.opt_str("default").map(str::to_string))
                    .unwrap_or_default();
                (block.string("name"), value)
            })
            .collect();

        let mut w = d.writer();
        w.set("datacenter", &datacenter)
            .set("subkeys", &subkeys)
            .set("var", &vars);
        w.finish()?;
        d.set_id(prefix);
        Ok(())
    }
}
