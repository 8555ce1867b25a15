use super::{datacenter_attr, partition_attr, token_attr};
use crate::client::catalog::{CatalogDeregistration, CatalogRegistration};
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, ProviderError, Resource, ResourceData, Result, Schema};
use tracing::info;

pub struct NodeResource;

#[async_trait]
impl Resource<ConsulContext> for NodeResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("name", Attribute::string().required().force_new())
            .attribute("address", Attribute::string().required().force_new())
            .attribute("datacenter", datacenter_attr())
            .attribute("meta", Attribute::map().optional())
            .attribute("token", token_attr())
            .attribute("partition", partition_attr())
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, write) = ctx.options(d)?;
        let datacenter = ctx.datacenter(d).await?;
        let name = d.string("name");
        let address = d.string("address");

        let registration = CatalogRegistration {
            node: name.clone(),
            address: address.clone(),
            datacenter: datacenter.clone(),
            node_meta: d.string_map("meta"),
            partition: d.string("partition"),
            ..Default::default()
        };
        ctx.client.catalog_register(&registration, &write).await?;

        if ctx.client.catalog_node(&name, &read).await?.is_none() {
            return Err(ProviderError::internal(format!(
                "node {:?} was registered but cannot be read back",
                name
            )));
        }
        info!(node = %name, datacenter = %datacenter, "Catalog node registered");

        let mut w = d.writer();
        w.set("datacenter", &datacenter);
        w.finish()?;
        d.set_id(format!("{}-{}", name, address));
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let datacenter = ctx.datacenter(d).await?;
        let name = d.string("name");
        let Some(found) = ctx.client.catalog_node(&name, &read).await? else {
            d.clear_id();
            return Ok(());
        };

        let node = found.node;
        let mut w = d.writer();
        w.set("name", &node.node)
            .set("address", &node.address)
            .set("meta", &node.meta)
            .set("datacenter", &datacenter);
        w.finish()
    }

    /// Re-registering a node replaces its metadata in place.
    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let registration = CatalogRegistration {
            node: d.string("name"),
            address: d.string("address"),
            datacenter: ctx.datacenter(d).await?,
            node_meta: d.string_map("meta"),
            partition: d.string("partition"),
            ..Default::default()
        };
        ctx.client.catalog_register(&registration, &write).await?;
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let deregistration = CatalogDeregistration {
            node: d.string("name"),
            datacenter: ctx.datacenter(d).await?,
            partition: d.string("partition"),
            ..Default::default()
        };
        ctx.client.catalog_deregister(&deregistration, &write).await?;
        d.clear_id();
        Ok(())
    }
}
