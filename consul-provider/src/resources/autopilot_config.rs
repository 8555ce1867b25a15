use super::datacenter_attr;
use crate::client::operator::AutopilotConfiguration;
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::utils::duration::{durations_equivalent, parse_duration};
use provider_core::{AttrRead, Attribute, ProviderError, Resource, ResourceData, Result, Schema};
use serde_json::json;

/// Singleton per datacenter: deleting it only forgets it.
pub struct AutopilotConfigResource;

fn config_from(d: &ResourceData) -> Result<AutopilotConfiguration> {
    for key in ["last_contact_threshold", "server_stabilization_time"] {
        parse_duration(d.str(key))?;
    }
    let non_negative = |key: &str| {
        u64::try_from(d.int(key)).map_err(|_| ProviderError::invalid(format!("{} must be non-negative", key)))
    };
    Ok(AutopilotConfiguration {
        cleanup_dead_servers: d.bool("cleanup_dead_servers"),
        last_contact_threshold: d.string("last_contact_threshold"),
        max_trailing_logs: non_negative("max_trailing_logs")?,
        min_quorum: non_negative("min_quorum")? as u32,
        server_stabilization_time: d.string("server_stabilization_time"),
        redundancy_zone_tag: d.string("redundancy_zone_tag"),
        disable_upgrade_migration: d.bool("disable_upgrade_migration"),
        upgrade_version_tag: d.string("upgrade_version_tag"),
    })
}

/// The server spells durations its own way; keep ours when they agree.
fn duration_as_configured(d: &ResourceData, key: &str, server: &str) -> String {
    let configured = d.string(key);
    if durations_equivalent(&json!(configured), &json!(server)) {
        configured
    } else {
        server.to_string()
    }
}

impl AutopilotConfigResource {
    async fn apply(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let datacenter = ctx.datacenter(d).await?;
        ctx.client.autopilot_set_config(&config_from(d)?, &write).await?;

        let mut w = d.writer();
        w.set("datacenter", &datacenter);
        w.finish()?;
        d.set_id(format!("consul-autopilot-{}", datacenter));
        self.read(ctx, d).await
    }
}

#[async_trait]
impl Resource<ConsulContext> for AutopilotConfigResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("datacenter", datacenter_attr())
            .attribute("cleanup_dead_servers", Attribute::bool().optional().default(true))
            .attribute(
                "last_contact_threshold",
                Attribute::string()
                    .optional()
                    .default("200ms")
                    .suppress_diff(durations_equivalent),
            )
            .attribute("max_trailing_logs", Attribute::int().optional().default(250))
            .attribute("min_quorum", Attribute::int().optional().default(0))
            .attribute(
                "server_stabilization_time",
                Attribute::string()
                    .optional()
                    .default("10s")
                    .suppress_diff(durations_equivalent),
            )
            .attribute("redundancy_zone_tag", Attribute::string().optional().default(""))
            .attribute("disable_upgrade_migration", Attribute::bool().optional().default(false))
            .attribute("upgrade_version_tag", Attribute::string().optional().default(""))
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        self.apply(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let config = ctx.client.autopilot_get_config(&read).await?;

        let last_contact = duration_as_configured(d, "last_contact_threshold", &config.last_contact_threshold);
        let stabilization =
            duration_as_configured(d, "server_stabilization_time", &config.server_stabilization_time);
        let mut w = d.writer();
        w.set("cleanup_dead_servers", &config.cleanup_dead_servers)
            .set("last_contact_threshold", &last_contact)
            .set("max_trailing_logs", &config.max_trailing_logs)
            .set("min_quorum", &config.min_quorum)
            .set("server_stabilization_time", &stabilization)
            .set("redundancy_zone_tag", &config.redundancy_zone_tag)
            .set("disable_upgrade_migration", &config.disable_upgrade_migration)
            .set("upgrade_version_tag", &config.upgrade_version_tag);
        w.finish()
    }

    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        self.apply(ctx, d).await
    }

    async fn delete(&self, _ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        d.clear_id();
        Ok(())
    }
}
