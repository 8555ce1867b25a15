use super::{datacenter_attr, token_attr};
use crate::client::query::{PreparedQuery, QueryDns, QueryFailover, QueryService, QueryTemplate};
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::{AttrRead, Attribute, Resource, ResourceData, Result, Schema};
use serde_json::{json, Value};

pub struct PreparedQueryResource;

fn query_from(d: &ResourceData) -> PreparedQuery {
    let failover = d
        .block("failover")
        .map(|b| QueryFailover {
            nearest_n: b.int("nearest_n"),
            datacenters: b.strings("datacenters"),
        })
        .unwrap_or_default();
    let dns = d
        .block("dns")
        .map(|b| QueryDns { ttl: b.string("ttl") })
        .unwrap_or_default();
    let template = d
        .block("template")
        .map(|b| QueryTemplate {
            template_type: b.string("type"),
            regexp: b.string("regexp"),
            remove_empty_tags: b.bool("remove_empty_tags"),
        })
        .unwrap_or_default();

    PreparedQuery {
        id: d.id().to_string(),
        name: d.string("name"),
        session: d.string("session"),
        token: d.string("stored_token"),
        template,
        service: QueryService {
            service: d.string("service"),
            failover,
            only_passing: d.bool("only_passing"),
            ignore_check_ids: d.strings("ignore_check_ids"),
            near: d.string("near"),
            tags: d.strings("tags"),
            node_meta: d.string_map("node_meta"),
            service_meta: d.string_map("service_meta"),
            connect: d.bool("connect"),
        },
        dns,
    }
}

/// Nested blocks are reported only when they carry a distinguishing value,
/// so an unset block never reads back as a block of zero values.
fn optional_blocks(q: &PreparedQuery) -> (Vec<Value>, Vec<Value>, Vec<Value>) {
    let failover = &q.service.failover;
    let failover = if failover.nearest_n > 0 || !failover.datacenters.is_empty() {
        vec![json!({"nearest_n": failover.nearest_n, "datacenters": failover.datacenters})]
    } else {
        Vec::new()
    };
    let dns = if q.dns.ttl.is_empty() {
        Vec::new()
    } else {
        vec![json!({"ttl": q.dns.ttl})]
    };
    let template = if q.template.template_type.is_empty() {
        Vec::new()
    } else {
        vec![json!({
            "type": q.template.template_type,
            "regexp": q.template.regexp,
            "remove_empty_tags": q.template.remove_empty_tags,
        })]
    };
    (failover, dns, template)
}

#[async_trait]
impl Resource<ConsulContext> for PreparedQueryResource {
    fn schema(&self) -> Schema {
        let failover = Schema::new(0)
            .attribute("nearest_n", Attribute::int().optional())
            .attribute("datacenters", Attribute::string_list().optional());
        let dns = Schema::new(0).attribute("ttl", Attribute::string().optional());
        let template = Schema::new(0)
            .attribute("type", Attribute::string().required())
            .attribute("regexp", Attribute::string().optional())
            .attribute("remove_empty_tags", Attribute::bool().optional().default(false));

        Schema::new(0)
            .attribute("name", Attribute::string().required())
            .attribute("datacenter", datacenter_attr())
            .attribute("session", Attribute::string().optional())
            .attribute("token", token_attr())
            .attribute(
                "stored_token",
                Attribute::string()
                    .optional()
                    .sensitive()
                    .description("ACL token stored with the query and used when it is executed."),
            )
            .attribute("service", Attribute::string().required())
            .attribute("tags", Attribute::string_set().optional())
            .attribute("near", Attribute::string().optional())
            .attribute("only_passing", Attribute::bool().optional().default(false))
            .attribute("connect", Attribute::bool().optional().default(false))
            .attribute("ignore_check_ids", Attribute::string_list().optional())
            .attribute("node_meta", Attribute::map().optional())
            .attribute("service_meta", Attribute::map().optional())
            .attribute("failover", Attribute::block_list(failover).optional().max_items(1))
            .attribute("dns", Attribute::block_list(dns).optional().max_items(1))
            .attribute("template", Attribute::block_list(template).optional().max_items(1))
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        let datacenter = ctx.datacenter(d).await?;
        let id = ctx.client.query_create(&query_from(d), &write).await?;

        let mut w = d.writer();
        w.set("datacenter", &datacenter);
        w.finish()?;
        d.set_id(id);
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let datacenter = ctx.datacenter(d).await?;
        let Some(query) = ctx.client.query_read(d.id(), &read).await? else {
            d.clear_id();
            return Ok(());
        };

        let (failover, dns, template) = optional_blocks(&query);
        let service = &query.service;
        let mut w = d.writer();
        w.set("name", &query.name)
            .set("datacenter", &datacenter)
            .set("session", &query.session)
            .set("stored_token", &query.token)
            .set("service", &service.service)
            .set("tags", &service.tags)
            .set("near", &service.near)
            .set("only_passing", &service.only_passing)
            .set("connect", &service.connect)
            .set("ignore_check_ids", &service.ignore_check_ids)
            .set("node_meta", &service.node_meta)
            .set("service_meta", &service.service_meta)
            .set("failover", &failover)
            .set("dns", &dns)
            .set("template", &template);
        w.finish()
    }

    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.query_update(&query_from(d), &write).await?;
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.query_delete(d.id(), &write).await?;
        d.clear_id();
        Ok(())
    }

    fn importable(&self) -> bool {
        true
    }
}
