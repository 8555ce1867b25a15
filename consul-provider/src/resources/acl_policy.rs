use super::{namespace_attr, observed_scope, partition_attr, trimmed_equal};
use crate::client::acl::AclPolicy;
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, Resource, ResourceData, Result, Schema};
use tracing::info;

pub struct AclPolicyResource;

fn policy_from(d: &ResourceData) -> AclPolicy {
    AclPolicy {
        id: d.id().to_string(),
        name: d.string("name"),
        description: d.string("description"),
        rules: d.string("rules"),
        datacenters: d.strings("datacenters"),
        namespace: d.string("namespace"),
        partition: d.string("partition"),
        modify_index: 0,
    }
}

#[async_trait]
impl Resource<ConsulContext> for AclPolicyResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("name", Attribute::string().required().description("The name of the policy."))
            .attribute("description", Attribute::string().optional())
            .attribute(
                "rules",
                Attribute::string()
                    .required()
                    .suppress_diff(trimmed_equal)
                    .description("The rules of the policy."),
            )
            .attribute(
                "datacenters",
                Attribute::string_set()
                    .optional()
                    .description("The datacenters the policy is valid in."),
            )
            .attribute("namespace", namespace_attr())
            .attribute("partition", partition_attr())
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let policy = ctx.client.acl_policy_create(&policy_from(d), &write).await?;
        info!(id = %policy.id, name = %policy.name, "ACL policy created");
        d.set_id(policy.id);
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let Some(policy) = ctx.client.acl_policy_read(d.id(), &read).await? else {
            d.clear_id();
            return Ok(());
        };

        let namespace = observed_scope(d, "namespace", &policy.namespace);
        let partition = observed_scope(d, "partition", &policy.partition);
        let mut w = d.writer();
        w.set("name", &policy.name)
            .set("description", &policy.description)
            .set("rules", &policy.rules)
            .set("datacenters", &policy.datacenters)
            .set("namespace", &namespace)
            .set("partition", &partition);
        w.finish()
    }

    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.acl_policy_update(&policy_from(d), &write).await?;
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.acl_policy_delete(d.id(), &write).await?;
        d.clear_id();
        Ok(())
    }

    fn importable(&self) -> bool {
        true
    }
}
