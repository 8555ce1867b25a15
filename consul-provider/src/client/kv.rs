use super::{escape_path, Body, ConsulClient, QueryMeta};
use crate::options::{ReadOptions, WriteOptions};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use provider_core::{ProviderError, Result};
use reqwest::Method;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawKvPair {
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    flags: u64,
    #[serde(default)]
    create_index: u64,
    #[serde(default)]
    modify_index: u64,
}

/// A decoded KV entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
    pub flags: u64,
    pub create_index: u64,
    pub modify_index: u64,
}

impl KvPair {
    pub fn value_string(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }
}

impl TryFrom<RawKvPair> for KvPair {
    type Error = ProviderError;

    fn try_from(raw: RawKvPair) -> Result<Self> {
        let value = match raw.value {
            Some(encoded) => STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                ProviderError::invalid(format!("key {:?}: value is not base64: {}", raw.key, e))
            })?,
            None => Vec::new(),
        };
        Ok(Self {
            key: raw.key,
            value,
            flags: raw.flags,
            create_index: raw.create_index,
            modify_index: raw.modify_index,
        })
    }
}

fn kv_path(key: &str) -> String {
    format!("/v1/kv/{}", escape_path(key.trim_start_matches('/')))
}

impl ConsulClient {
    pub async fn kv_get(&self, key: &str, opts: &ReadOptions) -> Result<Option<(KvPair, QueryMeta)>> {
        let found: Option<(Vec<RawKvPair>, QueryMeta)> = self.get_optional(&kv_path(key), opts, &[]).await?;
        match found {
            Some((pairs, meta)) => match pairs.into_iter().next() {
                Some(raw) => Ok(Some((KvPair::try_from(raw)?, meta))),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    pub async fn kv_list(&self, prefix: &str, opts: &ReadOptions) -> Result<(Vec<KvPair>, QueryMeta)> {
        let found: Option<(Vec<RawKvPair>, QueryMeta)> = self
            .get_optional(&kv_path(prefix), opts, &[("recurse", "")])
            .await?;
        match found {
            Some((pairs, meta)) => {
                let pairs = pairs.into_iter().map(KvPair::try_from).collect::<Result<_>>()?;
                Ok((pairs, meta))
            }
            None => Ok((Vec::new(), QueryMeta::default())),
        }
    }

    /// Write a key. With `cas`, the write only happens if the key's modify index
    /// still equals it; the return value says whether the write happened.
    pub async fn kv_put(
        &self,
        key: &str,
        value: &[u8],
        flags: u64,
        cas: Option<u64>,
        opts: &WriteOptions,
    ) -> Result<bool> {
        let flags = flags.to_string();
        let cas = cas.map(|c| c.to_string());
        let mut extra: Vec<(&str, &str)> = Vec::new();
        if flags != "0" {
            extra.push(("flags", flags.as_str()));
        }
        if let Some(cas) = &cas {
            extra.push(("cas", cas.as_str()));
        }
        let response = self
            .write_raw(Method::PUT, &kv_path(key), opts, &extra, Body::Raw(value))
            .await?;
        Ok(serde_json::from_slice(&response.body).unwrap_or(true))
    }

    pub async fn kv_delete(&self, key: &str, opts: &WriteOptions) -> Result<()> {
        self.delete(&kv_path(key), opts, &[]).await
    }

    pub async fn kv_delete_tree(&self, prefix: &str, opts: &WriteOptions) -> Result<()> {
        self.delete(&kv_path(prefix), opts, &[("recurse", "")]).await
    }
}
