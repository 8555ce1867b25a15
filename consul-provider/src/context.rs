//! Provider-scoped context handed to every handler: the client and the defaults.

use crate::client::ConsulClient;
use crate::config::ProviderSettings;
use crate::kv::KeyClient;
use crate::options::{resolve, Overrides, ProviderDefaults, ReadOptions, WriteOptions};
use provider_core::retry::Backoff;
use provider_core::{AttrRead, Result};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ConsulContext {
    pub client: ConsulClient,
    pub defaults: ProviderDefaults,
    pub attachment_retry: Backoff,
}

impl ConsulContext {
    /// Resolve settings from every layer and build the client.
    pub fn configure(config: &Map<String, Value>) -> Result<Self> {
        let settings = ProviderSettings::load(config)?;
        Self::from_settings(&settings)
    }

    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        crate::metrics::init_metrics();
        let client = ConsulClient::new(settings)?;
        let defaults = ProviderDefaults {
            datacenter: settings.datacenter.clone(),
            namespace: settings.namespace.clone(),
            partition: settings.partition.clone(),
            token: settings.token.clone(),
            allow_stale: settings.allow_stale,
            require_consistent: settings.require_consistent,
            wait_time: settings.wait_time()?,
        };
        info!(
            address = %client.base_url(),
            datacenter = ?defaults.datacenter,
            "Consul provider configured"
        );
        Ok(Self::new(client, defaults, settings.attachment_max_attempts))
    }

    pub fn new(client: ConsulClient, defaults: ProviderDefaults, attachment_attempts: u32) -> Self {
        Self {
            client,
            defaults,
            attachment_retry: Backoff::contended(attachment_attempts),
        }
    }

    /// A context whose Consul calls abort when `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            client: self.client.with_cancellation(token),
            ..self.clone()
        }
    }

    /// Options for an object, from its scope attributes and `query_options` block.
    pub fn options(&self, d: &impl AttrRead) -> Result<(ReadOptions, WriteOptions)> {
        let overrides = Overrides::from_attrs(d)?;
        Ok(resolve(&self.defaults, &overrides))
    }

    /// Provider-wide options, for objects that carry no scope attributes.
    pub fn default_options(&self) -> (ReadOptions, WriteOptions) {
        resolve(&self.defaults, &Overrides::default())
    }

    /// The datacenter an object lives in: its own, the provider's, or the agent's.
    pub async fn datacenter(&self, d: &impl AttrRead) -> Result<String> {
        if let Some(dc) = d.opt_str("datacenter") {
            return Ok(dc.to_string());
        }
        if let Some(dc) = d.block("query_options").and_then(|q| q.opt_str("datacenter").map(str::to_string)) {
            return Ok(dc);
        }
        if let Some(dc) = &self.defaults.datacenter {
            return Ok(dc.clone());
        }
        let (read, _) = self.options(d)?;
        self.client.agent_datacenter(&read).await
    }

    pub fn keys(&self, read: ReadOptions, write: WriteOptions) -> KeyClient<'_> {
        KeyClient::new(&self.client, read, write)
    }
}
