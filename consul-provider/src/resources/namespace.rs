use super::{observed_scope, partition_attr};
use crate::client::acl::AclLink;
use crate::client::namespace::{Namespace, NamespaceAcls};
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, Resource, ResourceData, Result, Schema};

pub struct NamespaceResource;

fn namespace_from(d: &ResourceData) -> Namespace {
    Namespace {
        name: d.string("name"),
        description: d.string("description"),
        acls: NamespaceAcls {
            policy_defaults: d.strings("policy_defaults").into_iter().map(AclLink::by_name).collect(),
            role_defaults: d.strings("role_defaults").into_iter().map(AclLink::by_name).collect(),
        },
        meta: d.string_map("meta"),
        partition: d.string("partition"),
        ..Default::default()
    }
}

fn names(links: &[AclLink]) -> Vec<&str> {
    links.iter().map(|l| l.name.as_str()).collect()
}

#[async_trait]
impl Resource<ConsulContext> for NamespaceResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("name", Attribute::string().required().force_new())
            .attribute("description", Attribute::string().optional())
            .attribute(
                "policy_defaults",
                Attribute::string_list()
                    .optional()
                    .description("Policy names applied to every token in the namespace."),
            )
            .attribute(
                "role_defaults",
                Attribute::string_list()
                    .optional()
                    .description("Role names applied to every token in the namespace."),
            )
            .attribute("meta", Attribute::map().optional())
            .attribute("partition", partition_attr())
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let ns = ctx.client.namespace_create(&namespace_from(d), &write).await?;
        d.set_id(ns.name);
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let Some(ns) = ctx.client.namespace_read(d.id(), &read).await? else {
            d.clear_id();
            return Ok(());
        };

        let partition = observed_scope(d, "partition", &ns.partition);
        let mut w = d.writer();
        w.set("name", &ns.name)
            .set("description", &ns.description)
            .set("policy_defaults", &names(&ns.acls.policy_defaults))
            .set("role_defaults", &names(&ns.acls.role_defaults))
            .set("meta", &ns.meta)
            .set("partition", &partition);
        w.finish()
    }

    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.namespace_update(&namespace_from(d), &write).await?;
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.namespace_delete(d.id(), &write).await?;
        d.clear_id();
        Ok(())
    }

    fn importable(&self) -> bool {
        true
    }
}
