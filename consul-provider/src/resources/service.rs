use super::{datacenter_attr, namespace_attr, observed_scope, partition_attr};
use crate::client::catalog::{
    AgentService, CatalogDeregistration, CatalogRegistration, HealthCheck, HealthCheckDefinition,
};
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, Block, ProviderError, Resource, ResourceData, Result, Schema};
use serde_json::{json, Value};
use tracing::info;

pub struct ServiceResource;

fn check_schema() -> Schema {
    let header = Schema::new(0)
        .attribute("name", Attribute::string().required())
        .attribute("value", Attribute::string_list().required());

    Schema::new(0)
        .attribute("check_id", Attribute::string().required())
        .attribute("name", Attribute::string().required())
        .attribute("notes", Attribute::string().optional())
        .attribute("status", Attribute::string().optional().default("critical"))
        .attribute("http", Attribute::string().optional())
        .attribute("tcp", Attribute::string().optional())
        .attribute("interval", Attribute::string().required())
        .attribute("timeout", Attribute::string().required())
        .attribute("method", Attribute::string().optional().default("GET"))
        .attribute("tls_skip_verify", Attribute::bool().optional().default(false))
        .attribute(
            "deregister_critical_service_after",
            Attribute::string().optional().default("30s"),
        )
        .attribute("header", Attribute::block_set(header).optional())
}

fn check_from(b: &Block<'_>, node: &str, service_id: &str, service_name: &str, namespace: &str) -> HealthCheck {
    let header = b
        .blocks("header")
        .iter()
        .map(|h| (h.string("name"), h.strings("value")))
        .collect();
    HealthCheck {
        node: node.to_string(),
        check_id: b.string("check_id"),
        name: b.string("name"),
        status: b.string("status"),
        notes: b.string("notes"),
        service_id: service_id.to_string(),
        service_name: service_name.to_string(),
        namespace: namespace.to_string(),
        definition: HealthCheckDefinition {
            http: b.string("http"),
            header,
            method: b.string("method"),
            tls_skip_verify: b.bool("tls_skip_verify"),
            tcp: b.string("tcp"),
            interval: b.string("interval"),
            timeout: b.string("timeout"),
            deregister_critical_service_after: b.string("deregister_critical_service_after"),
        },
    }
}

fn check_value(check: &HealthCheck) -> Value {
    let def = &check.definition;
    let header: Vec<Value> = def
        .header
        .iter()
        .map(|(name, value)| json!({"name": name, "value": value}))
        .collect();
    json!({
        "check_id": check.check_id,
        "name": check.name,
        "notes": check.notes,
        "status": check.status,
        "http": def.http,
        "tcp": def.tcp,
        "interval": def.interval,
        "timeout": def.timeout,
        "method": def.method,
        "tls_skip_verify": def.tls_skip_verify,
        "deregister_critical_service_after": def.deregister_critical_service_after,
        "header": header,
    })
}

fn service_id(d: &ResourceData) -> String {
    match d.opt_str("service_id") {
        Some(id) => id.to_string(),
        None => d.string("name"),
    }
}

fn port(d: &ResourceData) -> Result<u16> {
    let port = d.int("port");
    u16::try_from(port).map_err(|_| ProviderError::invalid(format!("port {} is out of range", port)))
}

impl ServiceResource {
    /// Register (or re-register) the service on its node.
    async fn register(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<String> {
        let (read, write) = ctx.options(d)?;
        let datacenter = ctx.datacenter(d).await?;
        let node_name = d.string("node");
        let id = service_id(d);
        let name = d.string("name");
        let namespace = d.string("namespace");

        let Some(node) = ctx.client.catalog_node(&node_name, &read).await? else {
            return Err(ProviderError::not_found(format!(
                "node {:?} does not exist, register it before its services",
                node_name
            )));
        };

        let checks = d
            .blocks("check")
            .iter()
            .map(|b| check_from(b, &node_name, &id, &name, &namespace))
            .collect();
        let registration = CatalogRegistration {
            node: node_name.clone(),
            address: node.node.address,
            datacenter: datacenter.clone(),
            service: Some(AgentService {
                id: id.clone(),
                service: name,
                tags: d.strings("tags"),
                address: d.string("address"),
                port: port(d)?,
                meta: d.string_map("meta"),
                enable_tag_override: d.bool("enable_tag_override"),
                namespace,
                partition: d.string("partition"),
            }),
            checks,
            skip_node_update: !d.bool("external"),
            partition: d.string("partition"),
            ..Default::default()
        };
        ctx.client.catalog_register(&registration, &write).await?;
        info!(service_id = %id, node = %node_name, "Catalog service registered");
        Ok(datacenter)
    }
}

#[async_trait]
impl Resource<ConsulContext> for ServiceResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("name", Attribute::string().required())
            .attribute(
                "service_id",
                Attribute::string()
                    .optional()
                    .computed()
                    .force_new()
                    .description("Defaults to the service name."),
            )
            .attribute("node", Attribute::string().required().force_new())
            .attribute("address", Attribute::string().optional().computed())
            .attribute("port", Attribute::int().optional())
            .attribute("tags", Attribute::string_list().optional())
            .attribute("meta", Attribute::map().optional())
            .attribute(
                "external",
                Attribute::bool()
                    .optional()
                    .default(false)
                    .description("Whether the node is external and may be updated by this service."),
            )
            .attribute("enable_tag_override", Attribute::bool().optional().default(false))
            .attribute("check", Attribute::block_set(check_schema()).optional())
            .attribute("datacenter", datacenter_attr())
            .attribute("namespace", namespace_attr())
            .attribute("partition", partition_attr())
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let datacenter = self.register(ctx, d).await?;
        let id = service_id(d);
        let mut w = d.writer();
        w.set("datacenter", &datacenter).set("service_id", &id);
        w.finish()?;
        d.set_id(id);
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let datacenter = ctx.datacenter(d).await?;
        let node_name = d.string("node");
        let id = d.id().to_string();

        let Some(node) = ctx.client.catalog_node(&node_name, &read).await? else {
            d.clear_id();
            return Ok(());
        };
        let Some(service) = node.services.values().find(|s| s.id == id) else {
            d.clear_id();
            return Ok(());
        };

        let checks: Vec<Value> = ctx
            .client
            .health_node_checks(&node_name, &read)
            .await?
            .iter()
            .filter(|c| c.service_id == id)
            .map(check_value)
            .collect();
        let namespace = observed_scope(d, "namespace", &service.namespace);
        let partition = observed_scope(d, "partition", &service.partition);
        let mut w = d.writer();
        w.set("name", &service.service)
            .set("service_id", &service.id)
            .set("address", &service.address)
            .set("port", &service.port)
            .set("tags", &service.tags)
            .set("meta", &service.meta)
            .set("enable_tag_override", &service.enable_tag_override)
            .set("check", &checks)
            .set("datacenter", &datacenter)
            .set("namespace", &namespace)
            .set("partition", &partition);
        w.finish()
    }

    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        self.register(ctx, d).await?;
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let deregistration = CatalogDeregistration {
            node: d.string("node"),
            datacenter: ctx.datacenter(d).await?,
            service_id: d.id().to_string(),
            namespace: d.string("namespace"),
            partition: d.string("partition"),
        };
        ctx.client.catalog_deregister(&deregistration, &write).await?;
        d.clear_id();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_check_round_trips_through_attribute_shape() {
        let schema = Arc::new(ServiceResource.schema());
        let d = ResourceData::from_config(
            schema,
            json!({
                "name": "web", "node": "n1",
                "check": [{
                    "check_id": "web:http", "name": "http", "interval": "10s", "timeout": "2s",
                    "http": "http://localhost:8080/health",
                    "header": [{"name": "X-Probe", "value": ["1"]}]
                }]
            })
            .as_object()
            .cloned()
            .unwrap(),
        )
        .unwrap();

        let blocks = d.blocks("check");
        let check = check_from(&blocks[0], "n1", "web", "web", "");
        assert_eq!(check.status, "critical");
        assert_eq!(check.definition.method, "GET");
        assert_eq!(check.definition.header["X-Probe"], vec!["1".to_string()]);

        let value = check_value(&check);
        assert_eq!(value["deregister_critical_service_after"], "30s");
        assert_eq!(value["header"][0]["name"], "X-Probe");
        assert_eq!(service_id(&d), "web");
    }

    #[test]
    fn test_port_range() {
        let schema = Arc::new(ServiceResource.schema());
        let d = ResourceData::from_config(
            schema,
            json!({"name": "web", "node": "n1", "port": 70000}).as_object().cloned().unwrap(),
        )
        .unwrap();
        assert!(port(&d).is_err());
    }
}
