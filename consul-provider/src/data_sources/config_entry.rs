use crate::client::config_entry::{payload_of, validate_kind};
use crate::context::ConsulContext;
use crate::resources::config_entry::entry_id;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, DataSource, ProviderError, ResourceData, Result, Schema};

pub struct ConfigEntryDataSource;

#[async_trait]
impl DataSource<ConsulContext> for ConfigEntryDataSource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("kind", Attribute::string().required())
            .attribute("name", Attribute::string().required())
            .attribute("namespace", Attribute::string().optional())
            .attribute("partition", Attribute::string().optional())
            .attribute(
                "config_json",
                Attribute::string()
                    .computed()
                    .description("The entry without its identity fields, as JSON."),
            )
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let kind = d.string("kind");
        let name = d.string("name");
        validate_kind(&kind)?;
        let (read, _) = ctx.options(d)?;
        let document = ctx
            .client
            .config_entry_get(&kind, &name, &read)
            .await?
            .ok_or_else(|| {
                ProviderError::not_found(format!("config entry {}/{} not found", kind, name))
            })?;

        let id = entry_id(&kind, &name, d.str("namespace"), d.str("partition"));
        let mut w = d.writer();
        w.set_json("config_json", &payload_of(document));
        w.finish()?;
        d.set_id(id);
        Ok(())
    }
}
