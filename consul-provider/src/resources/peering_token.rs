use super::partition_attr;
use crate::client::peering::GenerateTokenRequest;
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, Resource, ResourceData, Result, Schema};
use tracing::info;

/// Generate-only: the token cannot be read back, and generating a new one
/// for the same peer would invalidate the one already handed out.
pub struct PeeringTokenResource;

#[async_trait]
impl Resource<ConsulContext> for PeeringTokenResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute(
                "peer_name",
                Attribute::string()
                    .required()
                    .force_new()
                    .description("The name of the peer the token is generated for."),
            )
            .attribute("partition", partition_attr())
            .attribute("meta", Attribute::map().optional().force_new())
            .attribute(
                "server_external_addresses",
                Attribute::string_list().optional().force_new(),
            )
            .attribute(
                "peering_token",
                Attribute::string()
                    .computed()
                    .sensitive()
                    .description("The generated token, to be used by the peer to establish the peering."),
            )
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let request = GenerateTokenRequest {
            peer_name: d.string("peer_name"),
            partition: d.string("partition"),
            meta: d.string_map("meta"),
            server_external_addresses: d.strings("server_external_addresses"),
        };
        let token = ctx.client.peering_generate_token(&request, &write).await?;
        info!(peer = %request.peer_name, "Peering token generated");

        let mut w = d.writer();
        w.set("peering_token", token.expose());
        w.finish()?;
        d.set_id(request.peer_name);
        Ok(())
    }

    async fn read(&self, _ctx: &ConsulContext, _d: &mut ResourceData) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        d.clear_id();
        Ok(())
    }
}
