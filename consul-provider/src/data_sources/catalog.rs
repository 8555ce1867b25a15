//! Catalog queries. All of them honor a `query_options` block, blocking
//! parameters included.

use super::{datacenter_attr, query_options_attr};
use crate::client::catalog::{CatalogNode, CatalogService};
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, DataSource, ResourceData, Result, Schema};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

fn node_schema() -> Schema {
    Schema::new(0)
        .attribute("id", Attribute::string().computed())
        .attribute("name", Attribute::string().computed())
        .attribute("address", Attribute::string().computed())
        .attribute("meta", Attribute::map().computed())
        .attribute("tagged_addresses", Attribute::map().computed())
}

fn node_value(node: &CatalogNode) -> Value {
    json!({
        "id": node.id,
        "name": node.node,
        "address": node.address,
        "meta": node.meta,
        "tagged_addresses": node.tagged_addresses,
    })
}

pub struct CatalogNodesDataSource;

#[async_trait]
impl DataSource<ConsulContext> for CatalogNodesDataSource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("query_options", query_options_attr())
            .attribute("datacenter", datacenter_attr())
            .attribute("nodes", Attribute::block_list(node_schema()).computed())
            .attribute("node_ids", Attribute::string_list().computed())
            .attribute("node_names", Attribute::string_list().computed())
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let datacenter = ctx.datacenter(d).await?;
        let (nodes, meta) = ctx.client.catalog_nodes(&read).await?;
        debug!(count = nodes.len(), index = meta.last_index, "Catalog nodes listed");

        let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let names: Vec<&str> = nodes.iter().map(|n| n.node.as_str()).collect();
        let values: Vec<Value> = nodes.iter().map(node_value).collect();
        let mut w = d.writer();
        w.set("datacenter", &datacenter)
            .set("nodes", &values)
            .set("node_ids", &ids)
            .set("node_names", &names);
        w.finish()?;
        d.set_id(format!("catalog-nodes-{}", datacenter));
        Ok(())
    }
}

fn instance_schema() -> Schema {
    Schema::new(0)
        .attribute("id", Attribute::string().computed())
        .attribute("name", Attribute::string().computed())
        .attribute("address", Attribute::string().computed())
        .attribute("port", Attribute::int().computed())
        .attribute("tags", Attribute::string_list().computed())
        .attribute("meta", Attribute::map().computed())
        .attribute("enable_tag_override", Attribute::bool().computed())
        .attribute("node_id", Attribute::string().computed())
        .attribute("node_name", Attribute::string().computed())
        .attribute("node_address", Attribute::string().computed())
        .attribute("node_meta", Attribute::map().computed())
        .attribute("tagged_addresses", Attribute::map().computed())
        .attribute("create_index", Attribute::int().computed())
        .attribute("modify_index", Attribute::int().computed())
}

fn instance_value(s: &CatalogService) -> Value {
    json!({
        "id": s.service_id,
        "name": s.service_name,
        "address": s.service_address,
        "port": s.service_port,
        "tags": s.service_tags,
        "meta": s.service_meta,
        "enable_tag_override": s.service_enable_tag_override,
        "node_id": s.id,
        "node_name": s.node,
        "node_address": s.address,
        "node_meta": s.node_meta,
        "tagged_addresses": s.tagged_addresses,
        "create_index": s.create_index,
        "modify_index": s.modify_index,
    })
}

pub struct CatalogServiceDataSource;

#[async_trait]
impl DataSource<ConsulContext> for CatalogServiceDataSource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("name", Attribute::string().required())
            .attribute("tag", Attribute::string().optional())
            .attribute("filter", Attribute::string().optional())
            .attribute("query_options", query_options_attr())
            .attribute("datacenter", datacenter_attr())
            .attribute("service", Attribute::block_list(instance_schema()).computed())
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (mut read, _) = ctx.options(d)?;
        if let Some(filter) = d.opt_str("filter") {
            read.filter = Some(filter.to_string());
        }
        let datacenter = ctx.datacenter(d).await?;
        let name = d.string("name");
        let (instances, meta) = ctx
            .client
            .catalog_service(&name, d.opt_str("tag"), &read)
            .await?;
        debug!(service = %name, count = instances.len(), index = meta.last_index, "Catalog service listed");

        let id = format!("catalog-service-{}-{}-{}", datacenter, name, d.str("tag"));
        let values: Vec<Value> = instances.iter().map(instance_value).collect();
        let mut w = d.writer();
        w.set("datacenter", &datacenter).set("service", &values);
        w.finish()?;
        d.set_id(id);
        Ok(())
    }
}

pub struct CatalogServicesDataSource;

#[async_trait]
impl DataSource<ConsulContext> for CatalogServicesDataSource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute("query_options", query_options_attr())
            .attribute("datacenter", datacenter_attr())
            .attribute("names", Attribute::string_list().computed())
            .attribute(
                "services",
                Attribute::map()
                    .computed()
                    .description("Service names mapped to their space-separated tags."),
            )
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let datacenter = ctx.datacenter(d).await?;
        let (services, _) = ctx.client.catalog_services(&read).await?;

        let names: Vec<&str> = services.keys().map(String::as_str).collect();
        let tags: BTreeMap<&str, String> = services
            .iter()
            .map(|(name, tags)| {
                let mut tags = tags.clone();
                tags.sort();
                (name.as_str(), tags.join(" "))
            })
            .collect();
        let mut w = d.writer();
        w.set("datacenter", &datacenter)
            .set("names", &names)
            .set("services", &tags);
        w.finish()?;
        d.set_id(format!("catalog-services-{}", datacenter));
        Ok(())
    }
}

pub struct DatacentersDataSource;

#[async_trait]
impl DataSource<ConsulContext> for DatacentersDataSource {
    fn schema(&self) -> Schema {
        Schema::new(0).attribute("datacenters", Attribute::string_list().computed())
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let mut datacenters = ctx.client.catalog_datacenters().await?;
        datacenters.sort();
        let mut w = d.writer();
        w.set("datacenters", &datacenters);
        w.finish()?;
        d.set_id("datacenters");
        Ok(())
    }
}
