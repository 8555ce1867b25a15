use super::acl_role::{
    node_identities, node_identities_value, node_identity_schema, service_identities,
    service_identities_value, service_identity_schema,
};
use super::{namespace_attr, observed_scope, partition_attr};
use crate::client::acl::{AclLink, AclToken};
use crate::client::WireSecret;
use crate::context::ConsulContext;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use provider_core::{AttrRead, Attribute, ProviderError, Resource, ResourceData, Result, Schema};
use tracing::info;
use uuid::Uuid;

pub struct AclTokenResource;

fn check_uuid(key: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if Uuid::parse_str(v).is_err() => {
            Err(ProviderError::invalid(format!("{} must be a UUID", key)))
        }
        _ => Ok(()),
    }
}

fn parse_expiration(value: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).map_err(|e| {
        ProviderError::invalid(format!(
            "expiration_time {:?} is not an RFC 3339 timestamp: {}",
            value, e
        ))
    })
}

fn token_from(d: &ResourceData) -> Result<AclToken> {
    check_uuid("accessor_id", d.opt_str("accessor_id"))?;
    // never echo the secret itself
    check_uuid("secret_id", d.opt_str("secret_id"))?;
    let expiration_time = match d.opt_str("expiration_time") {
        Some(t) => {
            parse_expiration(t)?;
            Some(t.to_string())
        }
        None => None,
    };

    Ok(AclToken {
        accessor_id: match d.id() {
            "" => d.string("accessor_id"),
            id => id.to_string(),
        },
        secret_id: d.opt_str("secret_id").map(WireSecret::new),
        description: d.string("description"),
        policies: d.strings("policies").into_iter().map(AclLink::by_name).collect(),
        roles: d.strings("roles").into_iter().map(AclLink::by_name).collect(),
        service_identities: service_identities(d.blocks("service_identities")),
        node_identities: node_identities(d.blocks("node_identities")),
        local: d.bool("local"),
        expiration_time,
        namespace: d.string("namespace"),
        partition: d.string("partition"),
        modify_index: 0,
    })
}

/// Keep the configured spelling when the server reports the same instant.
fn observed_expiration(configured: Option<&str>, server: Option<&str>) -> Option<String> {
    match (configured, server) {
        (Some(c), Some(s)) => match (parse_expiration(c), parse_expiration(s)) {
            (Ok(a), Ok(b)) if a == b => Some(c.to_string()),
            _ => Some(s.to_string()),
        },
        (_, server) => server.map(str::to_string),
    }
}

#[async_trait]
impl Resource<ConsulContext> for AclTokenResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute(
                "accessor_id",
                Attribute::string()
                    .optional()
                    .computed()
                    .force_new()
                    .description("The uuid of the token. Generated by Consul when unset."),
            )
            .attribute(
                "secret_id",
                Attribute::string()
                    .optional()
                    .computed()
                    .force_new()
                    .sensitive()
                    .description("The secret of the token. Only known right after creation."),
            )
            .attribute("description", Attribute::string().optional())
            .attribute(
                "policies",
                Attribute::string_set()
                    .optional()
                    .description("Names of the policies linked to the token."),
            )
            .attribute(
                "roles",
                Attribute::string_set()
                    .optional()
                    .description("Names of the roles linked to the token."),
            )
            .attribute(
                "service_identities",
                Attribute::block_set(service_identity_schema()).optional(),
            )
            .attribute("node_identities", Attribute::block_list(node_identity_schema()).optional())
            .attribute("local", Attribute::bool().optional().force_new().default(false))
            .attribute(
                "expiration_time",
                Attribute::string()
                    .optional()
                    .force_new()
                    .description("RFC 3339 time after which the token is revoked."),
            )
            .attribute("namespace", namespace_attr())
            .attribute("partition", partition_attr())
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let token = ctx.client.acl_token_create(&token_from(d)?, &write).await?;
        info!(accessor_id = %token.accessor_id, "ACL token created");

        let mut w = d.writer();
        w.set("accessor_id", &token.accessor_id);
        if let Some(secret) = &token.secret_id {
            w.set("secret_id", secret.expose());
        }
        w.finish()?;
        d.set_id(token.accessor_id);
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let Some(token) = ctx.client.acl_token_read(d.id(), &read).await? else {
            d.clear_id();
            return Ok(());
        };

        let policies: Vec<&str> = token.policies.iter().map(|p| p.name.as_str()).collect();
        let roles: Vec<&str> = token.roles.iter().map(|r| r.name.as_str()).collect();
        let expiration = observed_expiration(d.opt_str("expiration_time"), token.expiration_time.as_deref());
        let namespace = observed_scope(d, "namespace", &token.namespace);
        let partition = observed_scope(d, "partition", &token.partition);
        // secret_id is left as stored: reads only ever return it redacted
        let mut w = d.writer();
        w.set("accessor_id", &token.accessor_id)
            .set("description", &token.description)
            .set("policies", &policies)
            .set("roles", &roles)
            .set("service_identities", &service_identities_value(&token.service_identities))
            .set("node_identities", &node_identities_value(&token.node_identities))
            .set("local", &token.local)
            .set("expiration_time", &expiration)
            .set("namespace", &namespace)
            .set("partition", &partition);
        w.finish()
    }

    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let mut token = token_from(d)?;
        token.secret_id = None;
        ctx.client.acl_token_update(&token, &write).await?;
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.acl_token_delete(d.id(), &write).await?;
        d.clear_id();
        Ok(())
    }

    fn importable(&self) -> bool {
        true
    }
}
