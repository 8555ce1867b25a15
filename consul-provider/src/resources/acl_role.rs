use super::{namespace_attr, observed_scope, partition_attr};
use crate::client::acl::{AclLink, AclRole, NodeIdentity, ServiceIdentity};
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, Block, Resource, ResourceData, Result, Schema};
use serde_json::{json, Value};

pub struct AclRoleResource;

pub(crate) fn service_identity_schema() -> Schema {
    Schema::new(0)
        .attribute("service_name", Attribute::string().required())
        .attribute("datacenters", Attribute::string_set().optional())
}

pub(crate) fn node_identity_schema() -> Schema {
    Schema::new(0)
        .attribute("node_name", Attribute::string().required())
        .attribute("datacenter", Attribute::string().required())
}

pub(crate) fn service_identities(blocks: Vec<Block<'_>>) -> Vec<ServiceIdentity> {
    blocks
        .iter()
        .map(|b| ServiceIdentity {
            service_name: b.string("service_name"),
            datacenters: b.strings("datacenters"),
        })
        .collect()
}

pub(crate) fn node_identities(blocks: Vec<Block<'_>>) -> Vec<NodeIdentity> {
    blocks
        .iter()
        .map(|b| NodeIdentity {
            node_name: b.string("node_name"),
            datacenter: b.string("datacenter"),
        })
        .collect()
}

pub(crate) fn service_identities_value(ids: &[ServiceIdentity]) -> Vec<Value> {
    ids.iter()
        .map(|s| json!({"service_name": s.service_name, "datacenters": s.datacenters}))
        .collect()
}

pub(crate) fn node_identities_value(ids: &[NodeIdentity]) -> Vec<Value> {
    ids.iter()
        .map(|n| json!({"node_name": n.node_name, "datacenter": n.datacenter}))
        .collect()
}

fn role_from(d: &ResourceData) -> AclRole {
    AclRole {
        id: d.id().to_string(),
        name: d.string("name"),
        description: d.string("description"),
        policies: d.strings("policies").into_iter().map(AclLink::by_id).collect(),
        service_identities: service_identities(d.blocks("service_identities")),
        node_identities: node_identities(d.blocks("node_identities")),
        namespace: d.string("namespace"),
        partition: d.string("partition"),
        modify_index: 0,
    }
}

#[async_trait]
impl Resource<ConsulContext> for AclRoleResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("name", Attribute::string().required().description("The name of the ACL role."))
            .attribute("description", Attribute::string().optional())
            .attribute(
                "policies",
                Attribute::string_set()
                    .optional()
                    .description("The list of policy IDs linked to the role."),
            )
            .attribute(
                "service_identities",
                Attribute::block_set(service_identity_schema()).optional(),
            )
            .attribute("node_identities", Attribute::block_list(node_identity_schema()).optional())
            .attribute("namespace", namespace_attr())
            .attribute("partition", partition_attr())
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let role = ctx.client.acl_role_create(&role_from(d), &write).await?;
        d.set_id(role.id);
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let Some(role) = ctx.client.acl_role_read(d.id(), &read).await? else {
            d.clear_id();
            return Ok(());
        };

        let policies: Vec<&str> = role.policies.iter().map(|p| p.id.as_str()).collect();
        let namespace = observed_scope(d, "namespace", &role.namespace);
        let partition = observed_scope(d, "partition", &role.partition);
        let mut w = d.writer();
        w.set("name", &role.name)
            .set("description", &role.description)
            .set("policies", &policies)
            .set("service_identities", &service_identities_value(&role.service_identities))
            .set("node_identities", &node_identities_value(&role.node_identities))
            .set("namespace", &namespace)
            .set("partition", &partition);
        w.finish()
    }

    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.acl_role_update(&role_from(d), &write).await?;
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.acl_role_delete(d.id(), &write).await?;
        d.clear_id();
        Ok(())
    }

    fn importable(&self) -> bool {
        true
    }
}
