//! ACL lookups: policies and roles by name, tokens by accessor id.

use crate::client::acl::{AclLink, AclToken};
use crate::context::ConsulContext;
use crate::resources::acl_role::{
    node_identities_value, node_identity_schema, service_identities_value,
    service_identity_schema,
};
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, DataSource, ProviderError, ResourceData, Result, Schema};
use serde_json::{json, Value};

fn scope(schema: Schema) -> Schema {
    schema
        .attribute("namespace", Attribute::string().optional())
        .attribute("partition", Attribute::string().optional())
}

fn link_schema() -> Schema {
    Schema::new(0)
        .attribute("id", Attribute::string().computed())
        .attribute("name", Attribute::string().computed())
}

fn links_value(links: &[AclLink]) -> Vec<Value> {
    links
        .iter()
        .map(|l| json!({"id": l.id, "name": l.name}))
        .collect()
}

pub struct AclPolicyDataSource;

#[async_trait]
impl DataSource<ConsulContext> for AclPolicyDataSource {
    fn schema(&self) -> Schema {
        scope(Schema::new(0))
            .attribute("name", Attribute::string().required())
            .attribute("description", Attribute::string().computed())
            .attribute("rules", Attribute::string().computed())
            .attribute("datacenters", Attribute::string_set().computed())
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let name = d.string("name");
        let policy = ctx
            .client
            .acl_policy_read_by_name(&name, &read)
            .await?
            .ok_or_else(|| ProviderError::not_found(format!("ACL policy {:?} not found", name)))?;

        let mut w = d.writer();
        w.set("description", &policy.description)
            .set("rules", &policy.rules)
            .set("datacenters", &policy.datacenters);
        w.finish()?;
        d.set_id(policy.id);
        Ok(())
    }
}

pub struct AclRoleDataSource;

#[async_trait]
impl DataSource<ConsulContext> for AclRoleDataSource {
    fn schema(&self) -> Schema {
        scope(Schema::new(0))
            .attribute("name", Attribute::string().required())
            .attribute("description", Attribute::string().computed())
            .attribute("policies", Attribute::block_list(link_schema()).computed())
            .attribute(
                "service_identities",
                Attribute::block_list(service_identity_schema()).computed(),
            )
            .attribute(
                "node_identities",
                Attribute::block_list(node_identity_schema()).computed(),
            )
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let name = d.string("name");
        let role = ctx
            .client
            .acl_role_read_by_name(&name, &read)
            .await?
            .ok_or_else(|| ProviderError::not_found(format!("ACL role {:?} not found", name)))?;

        let mut w = d.writer();
        w.set("description", &role.description)
            .set("policies", &links_value(&role.policies))
            .set("service_identities", &service_identities_value(&role.service_identities))
            .set("node_identities", &node_identities_value(&role.node_identities));
        w.finish()?;
        d.set_id(role.id);
        Ok(())
    }
}

async fn token(ctx: &ConsulContext, d: &ResourceData) -> Result<AclToken> {
    let (read, _) = ctx.options(d)?;
    let accessor_id = d.str("accessor_id");
    ctx.client
        .acl_token_read(accessor_id, &read)
        .await?
        .ok_or_else(|| ProviderError::not_found(format!("ACL token {:?} not found", accessor_id)))
}

/// Token metadata. The secret is never part of this lookup.
pub struct AclTokenDataSource;

#[async_trait]
impl DataSource<ConsulContext> for AclTokenDataSource {
    fn schema(&self) -> Schema {
        scope(Schema::new(0))
            .attribute("accessor_id", Attribute::string().required())
            .attribute("description", Attribute::string().computed())
            .attribute("local", Attribute::bool().computed())
            .attribute("expiration_time", Attribute::string().computed())
            .attribute("policies", Attribute::block_list(link_schema()).computed())
            .attribute("roles", Attribute::block_list(link_schema()).computed())
            .attribute(
                "service_identities",
                Attribute::block_list(service_identity_schema()).computed(),
            )
            .attribute(
                "node_identities",
                Attribute::block_list(node_identity_schema()).computed(),
            )
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let token = token(ctx, d).await?;

        let mut w = d.writer();
        w.set("description", &token.description)
            .set("local", &token.local)
            .set("expiration_time", &token.expiration_time.clone().unwrap_or_default())
            .set("policies", &links_value(&token.policies))
            .set("roles", &links_value(&token.roles))
            .set("service_identities", &service_identities_value(&token.service_identities))
            .set("node_identities", &node_identities_value(&token.node_identities));
        w.finish()?;
        d.set_id(token.accessor_id);
        Ok(())
    }
}

pub struct AclTokenSecretIdDataSource;

#[async_trait]
impl DataSource<ConsulContext> for AclTokenSecretIdDataSource {
    fn schema(&self) -> Schema {
        scope(Schema::new(0))
            .attribute("accessor_id", Attribute::string().required())
            .attribute("secret_id", Attribute::string().computed().sensitive())
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let token = token(ctx, d).await?;
        let secret = token.secret_id.as_ref().ok_or_else(|| {
            ProviderError::forbidden(format!(
                "the secret of ACL token {:?} was not returned; the request token needs acl:write",
                token.accessor_id
            ))
        })?;

        let mut w = d.writer();
        w.set("secret_id", secret.expose());
        w.finish()?;
        d.set_id(token.accessor_id.clone());
        Ok(())
    }
}
