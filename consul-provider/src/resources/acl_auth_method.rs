use super::{json_equivalent, namespace_attr, observed_scope, parse_json_object, partition_attr};
use crate::client::acl::{AclAuthMethod, NamespaceRule};
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::schema::scalar_to_string;
use provider_core::utils::duration::durations_equivalent;
use provider_core::{AttrRead, Attribute, ProviderError, Resource, ResourceData, Result, Schema};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub struct AclAuthMethodResource;

fn method_config(d: &ResourceData) -> Result<Map<String, Value>> {
    let map = d.string_map("config");
    let text = d.str("config_json");
    match (map.is_empty(), text.is_empty()) {
        (false, false) => Err(ProviderError::invalid(
            "only one of config and config_json may be set",
        )),
        (false, true) => Ok(map.into_iter().map(|(k, v)| (k, Value::String(v))).collect()),
        (true, false) => parse_json_object("config_json", text),
        (true, true) => Err(ProviderError::invalid(
            "one of config or config_json must be set",
        )),
    }
}

fn method_from(d: &ResourceData) -> Result<AclAuthMethod> {
    Ok(AclAuthMethod {
        name: d.string("name"),
        method_type: d.string("type"),
        display_name: d.string("display_name"),
        description: d.string("description"),
        max_token_ttl: d.string("max_token_ttl"),
        token_locality: d.string("token_locality"),
        config: method_config(d)?,
        namespace_rules: d
            .blocks("namespace_rule")
            .iter()
            .map(|b| NamespaceRule {
                selector: b.string("selector"),
                bind_namespace: b.string("bind_namespace"),
            })
            .collect(),
        namespace: d.string("namespace"),
        partition: d.string("partition"),
    })
}

#[async_trait]
impl Resource<ConsulContext> for AclAuthMethodResource {
    fn schema(&self) -> Schema {
        let rule = Schema::new(0)
            .attribute("selector", Attribute::string().optional())
            .attribute("bind_namespace", Attribute::string().required());

        Schema::new(0)
            .attribute("name", Attribute::string().required().force_new())
            .attribute(
                "type",
                Attribute::string()
                    .required()
                    .force_new()
                    .description("The type of auth method, e.g. kubernetes or jwt."),
            )
            .attribute("display_name", Attribute::string().optional())
            .attribute(
                "max_token_ttl",
                Attribute::string().optional().suppress_diff(durations_equivalent),
            )
            .attribute(
                "token_locality",
                Attribute::string()
                    .optional()
                    .description("Either local or global."),
            )
            .attribute("description", Attribute::string().optional())
            .attribute(
                "config",
                Attribute::map()
                    .optional()
                    .deprecated("use config_json, which supports nested values"),
            )
            .attribute(
                "config_json",
                Attribute::string().optional().suppress_diff(json_equivalent),
            )
            .attribute("namespace_rule", Attribute::block_list(rule).optional())
            .attribute("namespace", namespace_attr())
            .attribute("partition", partition_attr())
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let method = ctx.client.acl_auth_method_create(&method_from(d)?, &write).await?;
        d.set_id(format!("auth-method-{}", method.name));
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let name = d.string("name");
        let Some(method) = ctx.client.acl_auth_method_read(&name, &read).await? else {
            d.clear_id();
            return Ok(());
        };

        let rules: Vec<Value> = method
            .namespace_rules
            .iter()
            .map(|r| json!({"selector": r.selector, "bind_namespace": r.bind_namespace}))
            .collect();
        let legacy_config = d.is_set("config");
        let configured_ttl = d.string("max_token_ttl");
        let ttl = if durations_equivalent(&json!(configured_ttl), &json!(method.max_token_ttl)) {
            configured_ttl
        } else {
            method.max_token_ttl.clone()
        };
        let namespace = observed_scope(d, "namespace", &method.namespace);
        let partition = observed_scope(d, "partition", &method.partition);
        let mut w = d.writer();
        w.set("name", &method.name)
            .set("type", &method.method_type)
            .set("display_name", &method.display_name)
            .set("max_token_ttl", &ttl)
            .set("token_locality", &method.token_locality)
            .set("description", &method.description)
            .set("namespace_rule", &rules)
            .set("namespace", &namespace)
            .set("partition", &partition);
        if legacy_config {
            let flat: BTreeMap<&str, String> = method
                .config
                .iter()
                .map(|(k, v)| (k.as_str(), scalar_to_string(v)))
                .collect();
            w.set("config", &flat);
        } else {
            w.set_json("config_json", &method.config);
        }
        w.finish()
    }

    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.acl_auth_method_update(&method_from(d)?, &write).await?;
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.acl_auth_method_delete(d.str("name"), &write).await?;
        d.clear_id();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn data(config: Value) -> ResourceData {
        let schema = Arc::new(AclAuthMethodResource.schema());
        ResourceData::from_config(schema, config.as_object().cloned().unwrap()).unwrap()
    }

    #[test]
    fn test_config_sources_are_exclusive() {
        let d = data(json!({
            "name": "k8s", "type": "kubernetes",
            "config": {"Host": "https://k8s"},
            "config_json": "{\"Host\": \"https://k8s\"}"
        }));
        assert_eq!(
            method_config(&d).unwrap_err().kind(),
            provider_core::ErrorKind::Invalid
        );

        let d = data(json!({"name": "jwt", "type": "jwt", "config_json": "{\"BoundAudiences\": [\"a\"]}"}));
        let config = method_config(&d).unwrap();
        assert_eq!(config["BoundAudiences"], json!(["a"]));
    }

    #[test]
    fn test_max_token_ttl_suppresses_equivalent_durations() {
        let schema = AclAuthMethodResource.schema();
        let suppress = schema.get("max_token_ttl").and_then(|a| a.diff_suppress).unwrap();
        assert!(suppress(&json!("1h"), &json!("60m0s")));
        assert!(!suppress(&json!("1h"), &json!("2h")));
    }
}
