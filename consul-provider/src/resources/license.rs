use super::datacenter_attr;
use crate::client::operator::LicenseReply;
use crate::client::WireSecret;
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::schema::scalar_to_string;
use provider_core::{AttrRead, Attribute, ProviderError, Resource, ResourceData, Result, Schema};
use std::collections::BTreeMap;
use tracing::{info, warn};

pub const LICENSE_ID: &str = "consul-license";

pub struct LicenseResource;

fn computed(description: &'static str) -> Attribute {
    Attribute::string().computed().description(description)
}

impl LicenseResource {
    async fn install(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let license = WireSecret::new(d.string("license"));
        let reply = ctx.client.license_put(&license, &write).await?;
        if !reply.valid {
            return Err(ProviderError::invalid("the license was rejected by the server"));
        }
        info!(license_id = %reply.license.license_id, "License installed");
        for warning in &reply.warnings {
            warn!(warning = %warning, "License warning");
        }
        Ok(())
    }

    fn write(d: &mut ResourceData, reply: &LicenseReply) -> Result<()> {
        let l = &reply.license;
        let flags: BTreeMap<&str, String> = l
            .flags
            .iter()
            .map(|(k, v)| (k.as_str(), scalar_to_string(v)))
            .collect();
        let mut w = d.writer();
        w.set("valid", &reply.valid)
            .set("license_id", &l.license_id)
            .set("customer_id", &l.customer_id)
            .set("installation_id", &l.installation_id)
            .set("issue_time", &l.issue_time)
            .set("start_time", &l.start_time)
            .set("expiration_time", &l.expiration_time)
            .set("product", &l.product)
            .set("flags", &flags)
            .set("features", &l.features)
            .set("warnings", &reply.warnings);
        w.finish()
    }
}

#[async_trait]
impl Resource<ConsulContext> for LicenseResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("datacenter", datacenter_attr())
            .attribute(
                "license",
                Attribute::string()
                    .required()
                    .sensitive()
                    .description("The license text."),
            )
            .attribute("valid", Attribute::bool().computed())
            .attribute("license_id", computed("The ID of the license."))
            .attribute("customer_id", computed("The ID of the customer the license is attached to."))
            .attribute("installation_id", computed("The installations the license applies to."))
            .attribute("issue_time", computed("When the license was issued."))
            .attribute("start_time", computed("When the license starts being valid."))
            .attribute("expiration_time", computed("When the license expires."))
            .attribute("product", computed("The product the license applies to."))
            .attribute("flags", Attribute::map().computed())
            .attribute("features", Attribute::string_list().computed())
            .attribute("warnings", Attribute::string_list().computed())
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        self.install(ctx, d).await?;
        let datacenter = ctx.datacenter(d).await?;
        let mut w = d.writer();
        w.set("datacenter", &datacenter);
        w.finish()?;
        d.set_id(LICENSE_ID);
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let reply = ctx.client.license_get(&read).await?;
        Self::write(d, &reply)
    }

    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        self.install(ctx, d).await?;
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.license_reset(&write).await?;
        d.clear_id();
        Ok(())
    }
}
