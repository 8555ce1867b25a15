use super::datacenter_attr;
use crate::client::connect::Intention;
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, ProviderError, Resource, ResourceData, Result, Schema};

pub struct IntentionResource;

const ACTIONS: [&str; 2] = ["allow", "deny"];

fn intention_from(d: &ResourceData) -> Result<Intention> {
    let action = d.string("action");
    if !ACTIONS.contains(&action.as_str()) {
        return Err(ProviderError::invalid(format!(
            "action must be one of {:?}, got {:?}",
            ACTIONS, action
        )));
    }
    Ok(Intention {
        id: d.id().to_string(),
        description: d.string("description"),
        source_name: d.string("source_name"),
        source_ns: d.string("source_namespace"),
        destination_name: d.string("destination_name"),
        destination_ns: d.string("destination_namespace"),
        source_type: "consul".to_string(),
        action,
        meta: d.string_map("meta"),
    })
}

#[async_trait]
impl Resource<ConsulContext> for IntentionResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("source_name", Attribute::string().required().force_new())
            .attribute("source_namespace", Attribute::string().optional().force_new())
            .attribute("destination_name", Attribute::string().required().force_new())
            .attribute("destination_namespace", Attribute::string().optional().force_new())
            .attribute("action", Attribute::string().required().description("Either allow or deny."))
            .attribute("description", Attribute::string().optional())
            .attribute("meta", Attribute::map().optional())
            .attribute("datacenter", datacenter_attr())
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let datacenter = ctx.datacenter(d).await?;
        let id = ctx.client.intention_create(&intention_from(d)?, &write).await?;

        let mut w = d.writer();
        w.set("datacenter", &datacenter);
        w.finish()?;
        d.set_id(id);
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let datacenter = ctx.datacenter(d).await?;
        let Some(intention) = ctx.client.intention_read(d.id(), &read).await? else {
            d.clear_id();
            return Ok(());
        };

        let source_ns = super::observed_scope(d, "source_namespace", &intention.source_ns);
        let destination_ns = super::observed_scope(d, "destination_namespace", &intention.destination_ns);
        let mut w = d.writer();
        w.set("source_name", &intention.source_name)
            .set("source_namespace", &source_ns)
            .set("destination_name", &intention.destination_name)
            .set("destination_namespace", &destination_ns)
            .set("action", &intention.action)
            .set("description", &intention.description)
            .set("meta", &intention.meta)
            .set("datacenter", &datacenter);
        w.finish()
    }

    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.intention_update(&intention_from(d)?, &write).await?;
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.intention_delete(d.id(), &write).await?;
        d.clear_id();
        Ok(())
    }

    fn importable(&self) -> bool {
        true
    }
}
