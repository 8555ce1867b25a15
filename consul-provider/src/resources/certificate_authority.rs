use super::{json_equivalent, parse_json_object};
use crate::client::connect::CaConfiguration;
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::schema::scalar_to_string;
use provider_core::{AttrRead, Attribute, ProviderError, Resource, ResourceData, Result, Schema};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const CA_ID: &str = "consul-ca";

/// Connect CA configuration. There is one per cluster and it cannot be
/// removed, so delete only drops it from state.
pub struct CertificateAuthorityResource;

fn ca_from(d: &ResourceData) -> Result<CaConfiguration> {
    let map = d.string_map("config");
    let text = d.str("config_json");
    let config = match (map.is_empty(), text.is_empty()) {
        (false, false) => {
            return Err(ProviderError::invalid(
                "only one of config and config_json may be set",
            ))
        }
        (false, true) => map.into_iter().map(|(k, v)| (k, Value::String(v))).collect(),
        (true, false) => parse_json_object("config_json", text)?,
        (true, true) => Map::new(),
    };
    Ok(CaConfiguration {
        provider: d.string("connect_provider"),
        config,
    })
}

/// The server fills in defaults for every provider option; report only the
/// options the configuration names.
fn project(server: &Map<String, Value>, wanted: impl Iterator<Item = String>) -> Map<String, Value> {
    wanted
        .filter_map(|key| server.get(&key).map(|v| (key, v.clone())))
        .collect()
}

#[async_trait]
impl Resource<ConsulContext> for CertificateAuthorityResource {
    fn schema(&self) -> Schema {
        Schema::new(0)
            .attribute(
                "connect_provider",
                Attribute::string()
                    .required()
                    .description("The CA provider, e.g. consul or vault."),
            )
            .attribute(
                "config",
                Attribute::map()
                    .optional()
                    .deprecated("use config_json, which supports non-string values"),
            )
            .attribute(
                "config_json",
                Attribute::string().optional().suppress_diff(json_equivalent),
            )
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.ca_set_config(&ca_from(d)?, &write).await?;
        d.set_id(CA_ID);
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (read, _) = ctx.options(d)?;
        let ca = ctx.client.ca_get_config(&read).await?;

        let legacy = d.is_set("config");
        let json_keys: Vec<String> = match d.opt_str("config_json") {
            Some(text) => parse_json_object("config_json", text)?.keys().cloned().collect(),
            None => Vec::new(),
        };
        let map_keys: Vec<String> = d.string_map("config").into_keys().collect();

        let mut w = d.writer();
        w.set("connect_provider", &ca.provider);
        if legacy {
            let flat: BTreeMap<String, String> = project(&ca.config, map_keys.into_iter())
                .iter()
                .map(|(k, v)| (k.clone(), scalar_to_string(v)))
                .collect();
            w.set("config", &flat);
        } else if !json_keys.is_empty() {
            w.set_json("config_json", &project(&ca.config, json_keys.into_iter()));
        } else {
            w.set_json("config_json", &ca.config);
        }
        w.finish()
    }

    async fn update(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (_, write) = ctx.options(d)?;
        ctx.client.ca_set_config(&ca_from(d)?, &write).await?;
        self.read(ctx, d).await
    }

    async fn delete(&self, _ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        d.clear_id();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_keeps_requested_keys() {
        let server = json!({"LeafCertTTL": "72h", "RotationPeriod": "2160h", "PrivateKeyType": "ec"});
        let projected = project(
            server.as_object().unwrap(),
            vec!["LeafCertTTL".to_string(), "Missing".to_string()].into_iter(),
        );
        assert_eq!(Value::Object(projected), json!({"LeafCertTTL": "72h"}));
    }
}
