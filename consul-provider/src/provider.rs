//! Registration of every Consul handler, and the provider block itself.

use crate::attach::{RolePolicy, NAMESPACE_POLICY, NAMESPACE_ROLE, TOKEN_POLICY, TOKEN_ROLE};
use crate::context::ConsulContext;
use crate::data_sources::{acl, catalog, config_entry as config_entry_ds, key_prefix as key_prefix_ds};
use crate::data_sources::{keys as keys_ds, peering as peering_ds};
use crate::resources::*;
use provider_core::{Attribute, Provider, Result, Schema};
use serde_json::{Map, Value};

/// The provider block. Everything is optional; unset values fall back to
/// the settings file, then the environment, then built-in defaults.
pub fn provider_schema() -> Schema {
    Schema::new(0)
        .attribute("address", Attribute::string().optional())
        .attribute("scheme", Attribute::string().optional())
        .attribute("http_auth", Attribute::string().optional().sensitive())
        .attribute("datacenter", Attribute::string().optional())
        .attribute("token", Attribute::string().optional().sensitive())
        .attribute("namespace", Attribute::string().optional())
        .attribute("partition", Attribute::string().optional())
        .attribute("ca_file", Attribute::string().optional())
        .attribute("ca_path", Attribute::string().optional())
        .attribute("ca_pem", Attribute::string().optional())
        .attribute("cert_file", Attribute::string().optional())
        .attribute("key_file", Attribute::string().optional())
        .attribute("cert_pem", Attribute::string().optional())
        .attribute("key_pem", Attribute::string().optional().sensitive())
        .attribute("insecure_https", Attribute::bool().optional())
        .attribute("headers", Attribute::map().optional())
        .attribute("allow_stale", Attribute::bool().optional())
        .attribute("require_consistent", Attribute::bool().optional())
        .attribute("wait_time", Attribute::string().optional())
        .attribute("request_timeout", Attribute::string().optional())
        .attribute(
            "attachment_max_attempts",
            Attribute::int()
                .optional()
                .description("Attempts per attachment change before giving up with a conflict."),
        )
}

/// Validate the provider block and build the shared context.
pub fn configure(config: &Map<String, Value>) -> Result<ConsulContext> {
    provider_schema().validate_config(config)?;
    ConsulContext::configure(config)
}

pub fn provider() -> Provider<ConsulContext> {
    let mut p = Provider::new();

    p.register_resource("consul_acl_policy", acl_policy::AclPolicyResource)
        .register_resource("consul_acl_role", acl_role::AclRoleResource)
        .register_resource("consul_acl_token", acl_token::AclTokenResource)
        .register_resource("consul_acl_auth_method", acl_auth_method::AclAuthMethodResource)
        .register_resource("consul_acl_binding_rule", acl_binding_rule::AclBindingRuleResource)
        .register_resource("consul_acl_bootstrap_token", acl_bootstrap_token::AclBootstrapTokenResource)
        .register_resource("consul_acl_agent_token", acl_agent_token::AclAgentTokenResource)
        .register_resource(
            "consul_acl_role_policy_attachment",
            attachment::AttachmentResource::new(RolePolicy),
        )
        .register_resource(
            "consul_acl_token_policy_attachment",
            attachment::AttachmentResource::new(TOKEN_POLICY),
        )
        .register_resource(
            "consul_acl_token_role_attachment",
            attachment::AttachmentResource::new(TOKEN_ROLE),
        )
        .register_resource(
            "consul_namespace_policy_attachment",
            attachment::AttachmentResource::new(NAMESPACE_POLICY),
        )
        .register_resource(
            "consul_namespace_role_attachment",
            attachment::AttachmentResource::new(NAMESPACE_ROLE),
        )
        .register_resource("consul_namespace", namespace::NamespaceResource)
        .register_resource("consul_admin_partition", admin_partition::AdminPartitionResource)
        .register_resource("consul_node", node::NodeResource)
        .register_resource("consul_service", service::ServiceResource)
        .register_resource("consul_keys", keys::KeysResource)
        .register_resource("consul_key_prefix", key_prefix::KeyPrefixResource)
        .register_resource("consul_prepared_query", prepared_query::PreparedQueryResource)
        .register_resource("consul_intention", intention::IntentionResource)
        .register_resource("consul_config_entry", config_entry::ConfigEntryResource)
        .register_resource("consul_autopilot_config", autopilot_config::AutopilotConfigResource)
        .register_resource("consul_network_area", network_area::NetworkAreaResource)
        .register_resource(
            "consul_certificate_authority",
            certificate_authority::CertificateAuthorityResource,
        )
        .register_resource("consul_license", license::LicenseResource)
        .register_resource("consul_peering_token", peering_token::PeeringTokenResource)
        .register_resource("consul_peering", peering::PeeringResource);

    p.register_data_source("consul_keys", keys_ds::KeysDataSource)
        .register_data_source("consul_key_prefix", key_prefix_ds::KeyPrefixDataSource)
        .register_data_source("consul_acl_policy", acl::AclPolicyDataSource)
        .register_data_source("consul_acl_role", acl::AclRoleDataSource)
        .register_data_source("consul_acl_token", acl::AclTokenDataSource)
        .register_data_source("consul_acl_token_secret_id", acl::AclTokenSecretIdDataSource)
        .register_data_source("consul_catalog_nodes", catalog::CatalogNodesDataSource)
        .register_data_source("consul_catalog_service", catalog::CatalogServiceDataSource)
        .register_data_source("consul_catalog_services", catalog::CatalogServicesDataSource)
        .register_data_source("consul_datacenters", catalog::DatacentersDataSource)
        .register_data_source("consul_config_entry", config_entry_ds::ConfigEntryDataSource)
        .register_data_source("consul_peering", peering_ds::PeeringDataSource);

    p
}
