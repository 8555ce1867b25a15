use super::datacenter_attr;
use crate::context::ConsulContext;
use crate::resources::keys::KEYS_ID;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, DataSource, ProviderError, ResourceData, Result, Schema};
use std::collections::BTreeMap;

pub struct KeysDataSource;

fn key_schema() -> Schema {
    Schema::new(0)
        .attribute("name", Attribute::string().required())
        .attribute("path", Attribute::string().required())
        .attribute("default", Attribute::string().optional())
}

#[async_trait]
impl DataSource<ConsulContext> for KeysDataSource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("datacenter", datacenter_attr())
            .attribute("token", Attribute::string().optional().sensitive())
            .attribute("namespace", Attribute::string().optional())
            .attribute("partition", Attribute::string().optional())
            .attribute("key", Attribute::block_set(key_schema()).optional())
            .attribute(
                "error_on_missing_keys",
                Attribute::bool()
                    .optional()
                    .default(false)
                    .description("Fail when a key is absent and has no default."),
            )
            .attribute("var", Attribute::map().computed())
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, write) = ctx.options(d)?;
        let datacenter = ctx.datacenter(d).await?;
        let keys = ctx.keys(read, write);
        let strict = d.bool("error_on_missing_keys");

        let mut vars = BTreeMap::new();
        for block in d.blocks("key") {
            let path = block.str("path");
            let found = keys.get(path).await?;
            let value = match (found.exists, block.opt_str("default")) {
                (true, _) => found.value,
                (false, Some(default)) => default.to_string(),
                (false, None) if strict => {
                    return Err(ProviderError::not_found(format!("key {:?} does not exist", path)));
                }
                (false, None) => String::new(),
            };
            vars.insert(block.string("name"), value);
        }

        let mut w = d.writer();
        w.set("datacenter", &datacenter).set("var", &vars);
        w.finish()?;
        d.set_id(KEYS_ID);
        Ok(())
    }
}
