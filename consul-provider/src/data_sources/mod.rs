//! Read-only lookups. Each one performs a single read and records a
//! deterministic identifier.

pub mod acl;
pub mod catalog;
pub mod config_entry;
pub mod key_prefix;
pub mod keys;
pub mod peering;

use provider_core::{Attribute, Schema};

/// The `query_options` block accepted by the catalog lookups.
pub(crate) fn query_options_attr() -> Attribute {
    let block = Schema::new(0)
        .attribute("datacenter", Attribute::string().optional())
        .attribute("namespace", Attribute::string().optional())
        .attribute("partition", Attribute::string().optional())
        .attribute("token", Attribute::string().optional().sensitive())
        .attribute("allow_stale", Attribute::bool().optional())
        .attribute("require_consistent", Attribute::bool().optional())
        .attribute("near", Attribute::string().optional())
        .attribute("node_meta", Attribute::map().optional())
        .attribute(
            "wait_index",
            Attribute::int()
                .optional()
                .description("Block until the index moves past this value."),
        )
        .attribute(
            "wait_time",
            Attribute::string()
                .optional()
                .description("Upper bound of a blocking query, e.g. \"30s\"."),
        )
        .attribute("filter", Attribute::string().optional());
    Attribute::block_list(block).optional().max_items(1)
}

/// `datacenter` for lookups: optional and always reported.
pub(crate) fn datacenter_attr() -> Attribute {
    Attribute::string().optional().computed()
}
