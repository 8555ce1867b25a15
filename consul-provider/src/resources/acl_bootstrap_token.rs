use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::{Attribute, Resource, ResourceData, Result, Schema};
use tracing::info;

/// The initial management token of a fresh ACL system. Bootstrapping can
/// happen once per cluster, and the result cannot be read back afterwards.
pub struct AclBootstrapTokenResource;

#[async_trait]
impl Resource<ConsulContext> for AclBootstrapTokenResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("accessor_id", Attribute::string().computed())
            .attribute(
                "secret_id",
                Attribute::string()
                    .computed()
                    .sensitive()
                    .description("The secret of the bootstrap token."),
            )
            .attribute("description", Attribute::string().computed())
            .attribute("policies", Attribute::string_set().computed())
            .attribute("local", Attribute::bool().computed())
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.default_options();
        let token = ctx.client.acl_bootstrap(&write).await?;
        info!(accessor_id = %token.accessor_id, "ACL system bootstrapped");

        let policies: Vec<&str> = token.policies.iter().map(|p| p.name.as_str()).collect();
        let mut w = d.writer();
        w.set("accessor_id", &token.accessor_id)
            .set("description", &token.description)
            .set("policies", &policies)
            .set("local", &token.local);
        if let Some(secret) = &token.secret_id {
            w.set("secret_id", secret.expose());
        }
        w.finish()?;
        d.set_id(token.accessor_id);
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
