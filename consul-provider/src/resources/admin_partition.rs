use crate::client::partition::AdminPartition;
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, Resource, ResourceData, Result, Schema};

pub struct AdminPartitionResource;

fn partition_from(d: &ResourceData) -> AdminPartition {
    AdminPartition {
        name: d.string("name"),
        description: d.string("description"),
        deleted_at: None,
    }
}

#[async_trait]
impl Resource<ConsulContext> for AdminPartitionResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("name", Attribute::string().required().force_new())
            .attribute("description", Attribute::string().optional())
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.default_options();
        let partition = ctx.client.partition_create(&partition_from(d), &write).await?;
        d.set_id(partition.name);
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.default_options();
        let Some(partition) = ctx.client.partition_read(d.id(), &read).await? else {
            d.clear_id();
            return Ok(());
        };

        let mut w = d.writer();
        w.set("name", &partition.name)
            .set("description", &partition.description);
        w.finish()
    }

    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.default_options();
        ctx.client.partition_update(&partition_from(d), &write).await?;
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.default_options();
        ctx.client.partition_delete(d.id(), &write).await?;
        d.clear_id();
        Ok(())
    }

    fn importable(&self) -> bool {
        true
    }
}
