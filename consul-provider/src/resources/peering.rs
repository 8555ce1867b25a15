use super::{observed_scope, partition_attr};
use crate::client::peering::{EstablishRequest, Peering};
use crate::client::WireSecret;
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, Resource, ResourceData, Result, Schema, StateWriter};
use tracing::info;

pub struct PeeringResource;

/// Computed status attributes shared with the read-only lookup.
pub(crate) fn status_attributes(schema: Schema) -> Schema {
    schema
        .attribute("deleted_at", Attribute::string().computed())
        .attribute("id", Attribute::string().computed())
        .attribute("peer_id", Attribute::string().computed())
        .attribute("state", Attribute::string().computed())
        .attribute("peer_ca_pems", Attribute::string_list().computed())
        .attribute("peer_server_name", Attribute::string().computed())
        .attribute("peer_server_addresses", Attribute::string_list().computed())
        .attribute("imported_service_count", Attribute::int().computed())
        .attribute("exported_service_count", Attribute::int().computed())
}

pub(crate) fn write_status(w: &mut StateWriter<'_>, peering: &Peering) {
    w.set("deleted_at", &peering.deleted_at.clone().unwrap_or_default())
        .set("id", &peering.id)
        .set("peer_id", &peering.peer_id)
        .set("state", &peering.state)
        .set("peer_ca_pems", &peering.peer_ca_pems)
        .set("peer_server_name", &peering.peer_server_name)
        .set("peer_server_addresses", &peering.peer_server_addresses)
        .set("imported_service_count", &peering.stream_status.imported_services.len())
        .set("exported_service_count", &peering.stream_status.exported_services.len())
        .set("meta", &peering.meta);
}

#[async_trait]
impl Resource<ConsulContext> for PeeringResource {
    fn schema(&self) -> Schema {
        status_attributes(
            Schema::new(0)
                .attribute("peer_name", Attribute::string().required().force_new())
                .attribute(
                    "peering_token",
                    Attribute::string()
                        .required()
                        .force_new()
                        .sensitive()
                        .description("A token generated by the peer's consul_peering_token."),
                )
                .attribute("partition", partition_attr())
                .attribute("meta", Attribute::map().optional().force_new()),
        )
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let request = EstablishRequest {
            peer_name: d.string("peer_name"),
            peering_token: WireSecret::new(d.string("peering_token")),
            partition: d.string("partition"),
            meta: d.string_map("meta"),
        };
        ctx.client.peering_establish(&request, &write).await?;
        info!(peer = %request.peer_name, "Peering established");

        d.set_id(request.peer_name);
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let Some(peering) = ctx.client.peering_read(d.id(), &read).await? else {
            d.clear_id();
            return Ok(());
        };

        let partition = observed_scope(d, "partition", &peering.partition);
        let mut w = d.writer();
        w.set("peer_name", &peering.name).set("partition", &partition);
        write_status(&mut w, &peering);
        w.finish()
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.peering_delete(d.id(), &write).await?;
        d.clear_id();
        Ok(())
    }

    fn importable(&self) -> bool {
        true
    }
}
