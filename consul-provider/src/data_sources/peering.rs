use crate::context::ConsulContext;
use crate::resources::peering::{status_attributes, write_status};
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, DataSource, ProviderError, ResourceData, Result, Schema};

pub struct PeeringDataSource;

#[async_trait]
impl DataSource<ConsulContext> for PeeringDataSource {
    fn schema(&self) -> Schema {
        status_attributes(
            Schema::new(0)
                .attribute("peer_name", Attribute::string().required())
                .attribute("partition", Attribute::string().optional())
                .attribute("meta", Attribute::map().computed()),
        )
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let name = d.string("peer_name");
        let peering = ctx
            .client
            .peering_read(&name, &read)
            .await?
            .ok_or_else(|| ProviderError::not_found(format!("peering {:?} not found", name)))?;

        let mut w = d.writer();
        write_status(&mut w, &peering);
        w.finish()?;
        d.set_id(name);
        Ok(())
    }
}
