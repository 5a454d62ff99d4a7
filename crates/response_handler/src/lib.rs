//! Independent loop that polls `response` and commits payloads into the
//! result cache.
use std::{
    sync::Arc,
    time::Duration,
};

use broker::{
    Broker,
    BrokerTarget,
};
use cache::ResultCache;
use common::Backoff;
use request::{
    Request,
    RESPONSE_DELIMITER,
};

const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct ResponseHandler {
    broker: Arc<dyn Broker>,
    cache: Arc<ResultCache>,
}

impl ResponseHandler {
    pub fn new(broker: Arc<dyn Broker>, cache: Arc<ResultCache>) -> Self {
        Self { broker, cache }
    }

    /// Runs forever: poll `response` at a short interval, commit every
    /// entry found into the cache. Restarts with backoff on error rather
    /// than exiting the process over a transient broker failure.
    pub async fn start(self: Arc<Self>) {
        let mut backoff = Backoff::new(INITIAL_BACKOFF, MAX_BACKOFF);
        loop {
            match self.drain_once().await {
                Ok(drained) => {
                    backoff.reset();
                    if drained == 0 {
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                },
                Err(e) => {
                    let delay = {
                        let mut rng = rand::rng();
                        backoff.fail(&mut rng)
                    };
                    tracing::error!("response_handler: drain failed, retrying in {delay:?}: {e:#}");
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }

    /// Pops every entry currently in `response` and commits it to the
    /// cache, returning how many were processed.
    async fn drain_once(&self) -> anyhow::Result<usize> {
        let mut drained = 0;
        while let Some(raw) = self.broker.pop(BrokerTarget::Response).await? {
            self.commit_entry(&raw).await?;
            drained += 1;
        }
        Ok(drained)
    }

    async fn commit_entry(&self, raw: &str) -> anyhow::Result<()> {
        let Some((serialized_request, payload_raw)) = raw.split_once(RESPONSE_DELIMITER) else {
            tracing::error!("response_handler: malformed entry missing `{RESPONSE_DELIMITER}`, skipping");
            return Ok(());
        };
        let request = match Request::deserialize(serialized_request) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!("response_handler: unparseable request half, skipping: {e:#}");
                return Ok(());
            },
        };
        let payload: serde_json::Value = serde_json::from_str(payload_raw)?;
        self.cache.set(&request, payload).await?;
        Ok(())
    }
}
