use crate::client::agent::AGENT_TOKEN_SLOTS;
use crate::client::WireSecret;
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, ProviderError, Resource, ResourceData, Result, Schema};
use tracing::info;

/// A token installed in one of the agent's slots. Agents do not expose
/// their tokens, so the stored state is trusted as-is.
pub struct AclAgentTokenResource;

fn slot(d: &ResourceData) -> Result<String> {
    let slot = d.string("slot");
    if AGENT_TOKEN_SLOTS.contains(&slot.as_str()) {
        Ok(slot)
    } else {
        Err(ProviderError::invalid(format!(
            "slot must be one of {:?}, got {:?}",
            AGENT_TOKEN_SLOTS, slot
        )))
    }
}

#[async_trait]
impl Resource<ConsulContext> for AclAgentTokenResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute(
                "slot",
                Attribute::string()
                    .required()
                    .force_new()
                    .description("The token slot: default, agent, agent_recovery, replication or config_file_service_registration."),
            )
            .attribute(
                "secret_id",
                Attribute::string()
                    .required()
                    .sensitive()
                    .description("The secret of the token to install."),
            )
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let slot = slot(d)?;
        let (_, write) = ctx.default_options();
        ctx.client
            .agent_set_token(&slot, &WireSecret::new(d.string("secret_id")), &write)
            .await?;
        info!(slot = %slot, "Agent token installed");
        d.set_id(format!("agent-token-{}", slot));
        Ok(())
    }

    async fn read(&self, _ctx: &ConsulContext, _d: &mut ResourceData) -> Result<()> {
        Ok(())
    }

    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let slot = slot(d)?;
        let (_, write) = ctx.default_options();
        ctx.client
            .agent_set_token(&slot, &WireSecret::new(d.string("secret_id")), &write)
            .await
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let slot = slot(d)?;
        let (_, write) = ctx.default_options();
        ctx.client
            .agent_set_token(&slot, &WireSecret::new(""), &write)
            .await?;
        d.clear_id();
        Ok(())
    }
}
