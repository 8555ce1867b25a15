//! consul-provider: declarative lifecycle management of Consul objects.
//!
//! The host builds a [`ConsulContext`] once with [`configure`] and then
//! routes create/read/update/delete/import callbacks through [`provider()`].
pub mod attach;
pub mod client;
pub mod config;
pub mod context;
pub mod data_sources;
pub mod kv;
pub mod metrics;
pub mod options;
pub mod provider;
pub mod resources;

pub use client::ConsulClient;
pub use config::ProviderSettings;
pub use context::ConsulContext;
pub use options::{ProviderDefaults, ReadOptions, WriteOptions};
pub use provider::{configure, provider, provider_schema};
pub use provider_core;
