//! Result cache: a persistent mapping from hashed fingerprint to
//! `(result payload, unhashed fingerprint)`.
//!
//! Backed by the broker's `Cache` target rather than a second store, so a
//! cache entry and a queue entry share the same durability and corruption
//! handling instead of a parallel implementation.
use std::sync::Arc;

use broker::{
    Broker,
    BrokerTarget,
};
use request::Request;
use serde::{
    Deserialize,
    Serialize,
};

/// One cache record: the computed payload plus the unhashed fingerprint it
/// was computed for, so the "all requests" view can reconstruct a URL
/// without re-deriving it from the hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: serde_json::Value,
    pub unhashed_fingerprint: Vec<String>,
}

/// Persistent `fingerprint -> (payload, unhashed fingerprint)` mapping.
pub struct ResultCache {
    broker: Arc<dyn Broker>,
}

impl ResultCache {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Looks up a cached payload by the request's hashed fingerprint.
    pub async fn get(&self, request: &Request) -> anyhow::Result<Option<serde_json::Value>> {
        let key = request.fingerprint_hex();
        let Some(raw) = self.broker.get(BrokerTarget::Cache, &key).await? else {
            return Ok(None);
        };
        let entry: CacheEntry = serde_json::from_str(&raw)?;
        Ok(Some(entry.payload))
    }

    /// Stores `(payload, unhashed_fingerprint)` under the request's hashed
    /// fingerprint, overwriting any previous entry for the same key.
    pub async fn set(&self, request: &Request, payload: serde_json::Value) -> anyhow::Result<()> {
        let key = request.fingerprint_hex();
        let entry = CacheEntry {
            payload,
            unhashed_fingerprint: request.fingerprint_unhashed(),
        };
        let raw = serde_json::to_string(&entry)?;
        if self.broker.is_item(BrokerTarget::Cache, &key).await? {
            self.broker.update(BrokerTarget::Cache, &key, &raw).await
        } else {
            self.broker.add(BrokerTarget::Cache, &key, &raw).await
        }
    }

    /// All cached `(hashed fingerprint, entry)` pairs, in insertion order —
    /// the source for the `/all_requests` listing.
    pub async fn items(&self) -> anyhow::Result<Vec<(String, CacheEntry)>> {
        let raw_items = self.broker.get_all_items(BrokerTarget::Cache).await?;
        let mut items = Vec::with_capacity(raw_items.len());
        for (key, raw) in raw_items {
            let entry: CacheEntry = serde_json::from_str(&raw)?;
            items.push((key, entry));
        }
        Ok(items)
    }
}
