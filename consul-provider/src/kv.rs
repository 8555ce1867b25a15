//! Narrow KV wrapper bound to one set of resolved options.

use crate::client::kv::KvPair;
use crate::client::ConsulClient;
use crate::options::{ReadOptions, WriteOptions};
use provider_core::{ProviderError, Result};
use tracing::debug;

/// What a single-key lookup observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValue {
    pub exists: bool,
    pub value: String,
    pub flags: u64,
    pub modify_index: u64,
}

pub struct KeyClient<'a> {
    client: &'a ConsulClient,
    read: ReadOptions,
    write: WriteOptions,
}

impl<'a> KeyClient<'a> {
    pub fn new(client: &'a ConsulClient, read: ReadOptions, write: WriteOptions) -> Self {
        Self { client, read, write }
    }

    pub async fn get(&self, path: &str) -> Result<KeyValue> {
        debug!(path = %path, "Reading key");
        Ok(match self.client.kv_get(path, &self.read).await? {
            Some((pair, _)) => KeyValue {
                exists: true,
                value: pair.value_string(),
                flags: pair.flags,
                modify_index: pair.modify_index,
            },
            None => KeyValue::default(),
        })
    }

    /// Every key under `prefix`, with full paths.
    pub async fn list(&self, prefix: &str) -> Result<Vec<KvPair>> {
        debug!(prefix = %prefix, "Listing keys");
        let (pairs, _) = self.client.kv_list(prefix, &self.read).await?;
        Ok(pairs)
    }

    pub async fn put(&self, path: &str, value: &str, flags: u64) -> Result<()> {
        debug!(path = %path, flags, "Writing key");
        self.client
            .kv_put(path, value.as_bytes(), flags, None, &self.write)
            .await?;
        Ok(())
    }

    /// Compare-and-set against `index`. A mismatch is a conflict, not retried.
    pub async fn cas(&self, path: &str, value: &str, flags: u64, index: u64) -> Result<()> {
        debug!(path = %path, flags, index, "Writing key with check-and-set");
        let written = self
            .client
            .kv_put(path, value.as_bytes(), flags, Some(index), &self.write)
            .await?;
        if written {
            Ok(())
        } else {
            Err(ProviderError::conflict(format!(
                "failed to write {:?}: check-and-set index {} did not match",
                path, index
            )))
        }
    }

    /// Delete one key. An already-absent key is not an error.
    pub async fn delete(&self, path: &str) -> Result<()> {
        debug!(path = %path, "Deleting key");
        match self.client.kv_delete(path, &self.write).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    pub async fn delete_tree(&self, prefix: &str) -> Result<()> {
        debug!(prefix = %prefix, "Deleting key tree");
        match self.client.kv_delete_tree(prefix, &self.write).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }
}
