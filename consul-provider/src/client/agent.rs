use super::{escape, ConsulClient, WireSecret};
use crate::options::{ReadOptions, WriteOptions};
use provider_core::{ProviderError, Result};
use serde::Serialize;
use serde_json::Value;

/// Token slots an agent accepts through `/v1/agent/token/<slot>`.
pub const AGENT_TOKEN_SLOTS: [&str; 6] = [
    "default",
    "agent",
    "agent_recovery",
    "master",
    "replication",
    "config_file_service_registration",
];

#[derive(Serialize)]
struct AgentTokenBody<'a> {
    #[serde(rename = "Token")]
    token: &'a WireSecret,
}

impl ConsulClient {
    /// The datacenter of the agent we are talking to.
    pub async fn agent_datacenter(&self, opts: &ReadOptions) -> Result<String> {
        let (info, _): (Value, _) = self.get("/v1/agent/self", opts, &[]).await?;
        info.pointer("/Config/Datacenter")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProviderError::internal("agent self-description carries no datacenter"))
    }

    /// Install a token in one of the agent's slots. An empty token clears it.
    pub async fn agent_set_token(&self, slot: &str, token: &WireSecret, opts: &WriteOptions) -> Result<()> {
        if !AGENT_TOKEN_SLOTS.contains(&slot) {
            return Err(ProviderError::invalid(format!(
                "unknown agent token slot {:?}, expected one of {:?}",
                slot, AGENT_TOKEN_SLOTS
            )));
        }
        let path = format!("/v1/agent/token/{}", escape(slot));
        let _: Value = self.put(&path, opts, &AgentTokenBody { token }).await?;
        Ok(())
    }
}
