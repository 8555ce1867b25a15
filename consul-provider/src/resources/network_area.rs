use super::{datacenter_attr, token_attr};
use crate::client::operator::NetworkArea;
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, Resource, ResourceData, Result, Schema};

pub struct NetworkAreaResource;

fn area_from(d: &ResourceData) -> NetworkArea {
    NetworkArea {
        id: d.id().to_string(),
        peer_datacenter: d.string("peer_datacenter"),
        retry_join: d.strings("retry_join"),
        use_tls: d.bool("use_tls"),
    }
}

#[async_trait]
impl Resource<ConsulContext> for NetworkAreaResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("datacenter", datacenter_attr())
            .attribute("token", token_attr())
            .attribute("peer_datacenter", Attribute::string().required().force_new())
            .attribute(
                "retry_join",
                Attribute::string_list()
                    .optional()
                    .description("Addresses of servers in the peer datacenter to join."),
            )
            .attribute("use_tls", Attribute::bool().optional().default(false))
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let datacenter = ctx.datacenter(d).await?;
        let id = ctx.client.area_create(&area_from(d), &write).await?;

        let mut w = d.writer();
        w.set("datacenter", &datacenter);
        w.finish()?;
        d.set_id(id);
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let datacenter = ctx.datacenter(d).await?;
        let Some(area) = ctx.client.area_read(d.id(), &read).await? else {
            d.clear_id();
            return Ok(());
        };

        let mut w = d.writer();
        w.set("datacenter", &datacenter)
            .set("peer_datacenter", &area.peer_datacenter)
            .set("retry_join", &area.retry_join)
            .set("use_tls", &area.use_tls);
        w.finish()
    }

    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.area_update(&area_from(d), &write).await?;
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.area_delete(d.id(), &write).await?;
        d.clear_id();
        Ok(())
    }

    fn importable(&self) -> bool {
        true
    }
}
