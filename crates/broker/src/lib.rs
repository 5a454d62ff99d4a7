//! Durable key/value queue/store backing the request pipeline.
//!
//! The broker is the only shared mutable state in the system: the
//! job controller, response handler, and frontend never talk to each other
//! directly, only through `add`/`remove`/`update`/`get`/`pop` on one of the
//! four named targets. Every operation here is atomic with respect to other
//! operations on the *same* target (guarded by a per-target lock); no
//! cross-target atomicity is promised.
mod file_broker;
mod target;

use async_trait::async_trait;
pub use file_broker::FileBroker;
pub use target::BrokerTarget;

/// A durable key/value queue/store. One entry maps one key to one value;
/// duplicate keys may exist in a target but only the first is authoritative
/// for `get`/`pop`.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn add(&self, target: BrokerTarget, key: &str, value: &str) -> anyhow::Result<()>;

    /// Removes the first entry with a matching key. No-op if absent.
    async fn remove(&self, target: BrokerTarget, key: &str) -> anyhow::Result<()>;

    /// Replaces the value of the first matching key. No-op if absent.
    async fn update(&self, target: BrokerTarget, key: &str, value: &str) -> anyhow::Result<()>;

    /// Returns the value of the first matching key, or `None` if absent.
    async fn get(&self, target: BrokerTarget, key: &str) -> anyhow::Result<Option<String>>;

    async fn get_keys(&self, target: BrokerTarget) -> anyhow::Result<Vec<String>>;

    async fn get_all_items(&self, target: BrokerTarget) -> anyhow::Result<Vec<(String, String)>>;

    /// Removes and returns the first value added to the target (FIFO),
    /// `None` if the target is empty.
    async fn pop(&self, target: BrokerTarget) -> anyhow::Result<Option<String>>;

    async fn is_item(&self, target: BrokerTarget, key: &str) -> anyhow::Result<bool>;
}
