use super::{namespace_attr, observed_scope, partition_attr};
use crate::client::acl::AclBindingRule;
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, Resource, ResourceData, Result, Schema};

pub struct AclBindingRuleResource;

fn rule_from(d: &ResourceData) -> AclBindingRule {
    AclBindingRule {
        id: d.id().to_string(),
        description: d.string("description"),
        auth_method: d.string("auth_method"),
        selector: d.string("selector"),
        bind_type: d.string("bind_type"),
        bind_name: d.string("bind_name"),
        namespace: d.string("namespace"),
        partition: d.string("partition"),
    }
}

#[async_trait]
impl Resource<ConsulContext> for AclBindingRuleResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("auth_method", Attribute::string().required())
            .attribute("description", Attribute::string().optional())
            .attribute("selector", Attribute::string().optional())
            .attribute(
                "bind_type",
                Attribute::string()
                    .required()
                    .description("Either service, node, role or policy."),
            )
            .attribute("bind_name", Attribute::string().required())
            .attribute("namespace", namespace_attr())
            .attribute("partition", partition_attr())
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let rule = ctx.client.acl_binding_rule_create(&rule_from(d), &write).await?;
        d.set_id(rule.id);
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let Some(rule) = ctx.client.acl_binding_rule_read(d.id(), &read).await? else {
            d.clear_id();
            return Ok(());
        };

        let namespace = observed_scope(d, "namespace", &rule.namespace);
        let partition = observed_scope(d, "partition", &rule.partition);
        let mut w = d.writer();
        w.set("auth_method", &rule.auth_method)
            .set("description", &rule.description)
            .set("selector", &rule.selector)
            .set("bind_type", &rule.bind_type)
            .set("bind_name", &rule.bind_name)
            .set("namespace", &namespace)
            .set("partition", &partition);
        w.finish()
    }

    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.acl_binding_rule_update(&rule_from(d), &write).await?;
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.acl_binding_rule_delete(d.id(), &write).await?;
        d.clear_id();
        Ok(())
    }

    fn importable(&self) -> bool {
        true
    }
}
