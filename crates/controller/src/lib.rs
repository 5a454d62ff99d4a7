//! Job controller: bounded worker concurrency, the `request -> process ->
//! response` transition, restart recovery, and per-job timeout.
//!
//! A `FuturesUnordered` of in-flight job futures plus a map of in-flight
//! fingerprints bound concurrency, and `select_biased!` drains a completed
//! job before considering new work.
use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use broker::{
    Broker,
    BrokerTarget,
};
use cohort::CohortResolver;
use common::Backoff;
use common::env::env_config;
use futures::{
    future,
    select_biased,
    stream::FuturesUnordered,
    FutureExt,
    StreamExt,
};
use metric_registry::{
    AggregatorRegistry,
    MetricDataSource,
    MetricRegistry,
};
use request::{
    Request,
    RESPONSE_DELIMITER,
};
use tokio::task::{
    AbortHandle,
    JoinHandle,
};

const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Short interval the controller sleeps between poll cycles to bound
/// polling cost.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

struct JobOutcome {
    fingerprint: String,
    serialized_request: String,
    payload: serde_json::Value,
}

/// One entry per broker target a fingerprint can currently be observed in,
/// used by the `/job_queue` listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
}

pub struct Controller {
    broker: Arc<dyn Broker>,
    cohort_resolver: Arc<dyn CohortResolver>,
    data_source: Arc<dyn MetricDataSource>,
    metrics: Arc<MetricRegistry>,
    aggregators: Arc<AggregatorRegistry>,
    max_concurrent_jobs: usize,
    job_timeout: Duration,
    running_handles: parking_lot::Mutex<HashMap<String, AbortHandle>>,
}

impl Controller {
    pub fn new(
        broker: Arc<dyn Broker>,
        cohort_resolver: Arc<dyn CohortResolver>,
        data_source: Arc<dyn MetricDataSource>,
        metrics: Arc<MetricRegistry>,
        aggregators: Arc<AggregatorRegistry>,
    ) -> Self {
        Self {
            broker,
            cohort_resolver,
            data_source,
            metrics,
            aggregators,
            max_concurrent_jobs: env_config("METRICS_MAX_CONCURRENT_JOBS", 2usize),
            job_timeout: Duration::from_secs(env_config("METRICS_JOB_TIMEOUT_SECS", 600u64)),
            running_handles: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Runs forever, restarting the poll loop with backoff if it errors
    /// (broker IO failures). Intended to be spawned as one long-lived task.
    pub async fn start(self: Arc<Self>) {
        let mut backoff = Backoff::new(INITIAL_BACKOFF, MAX_BACKOFF);
        if let Err(e) = self.recover_on_startup().await {
            tracing::error!("controller: restart recovery failed: {e:#}");
        }
        loop {
            match self.run().await {
                Ok(()) => unreachable!("run() only returns on error"),
                Err(e) => {
                    let delay = {
                        let mut rng = rand::rng();
                        backoff.fail(&mut rng)
                    };
                    tracing::error!("controller: poll loop failed, retrying in {delay:?}: {e:#}");
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }

    /// Pessimistic restart recovery: every
    /// fingerprint left in `process` at startup is treated as abandoned — a
    /// failure payload is written to `response` and the entry removed,
    /// rather than re-enqueued, to avoid double-billing an expensive metric
    /// computation that may already be mid-flight against the database.
    pub async fn recover_on_startup(&self) -> anyhow::Result<()> {
        for (fingerprint, serialized_request) in self.broker.get_all_items(BrokerTarget::Process).await? {
            tracing::warn!("controller: recovering abandoned job {fingerprint}");
            self.broker.remove(BrokerTarget::Process, &fingerprint).await?;
            let value = response_entry(
                &serialized_request,
                &serde_json::json!({ "data": "job abandoned by controller restart" }),
            )?;
            self.broker.add(BrokerTarget::Response, &fingerprint, &value).await?;
        }
        Ok(())
    }

    /// Removes a running or queued fingerprint and writes a failure
    /// payload, the admin "drop job" operation. Returns `false` if
    /// the fingerprint was not found in either target.
    pub async fn cancel(&self, fingerprint: &str) -> anyhow::Result<bool> {
        if let Some(serialized_request) = self.broker.get(BrokerTarget::Request, fingerprint).await? {
            self.broker.remove(BrokerTarget::Request, fingerprint).await?;
            let value = response_entry(
                &serialized_request,
                &serde_json::json!({ "data": "job cancelled by admin" }),
            )?;
            self.broker.add(BrokerTarget::Response, fingerprint, &value).await?;
            return Ok(true);
        }

        let Some(serialized_request) = self.broker.get(BrokerTarget::Process, fingerprint).await? else {
            return Ok(false);
        };
        if let Some(handle) = self.running_handles.lock().remove(fingerprint) {
            handle.abort();
        }
        self.broker.remove(BrokerTarget::Process, fingerprint).await?;
        let value = response_entry(
            &serialized_request,
            &serde_json::json!({ "data": "job cancelled by admin" }),
        )?;
        self.broker.add(BrokerTarget::Response, fingerprint, &value).await?;
        Ok(true)
    }

    /// Entries across `request`/`process`, labeled with their lifecycle
    /// state, for the `/job_queue` listing.
    pub async fn job_states(&self) -> anyhow::Result<Vec<(String, JobState)>> {
        let mut states = Vec::new();
        for key in self.broker.get_keys(BrokerTarget::Request).await? {
            states.push((key, JobState::Queued));
        }
        for key in self.broker.get_keys(BrokerTarget::Process).await? {
            states.push((key, JobState::Running));
        }
        Ok(states)
    }

    async fn run(&self) -> anyhow::Result<()> {
        let mut running: FuturesUnordered<JoinHandle<JobOutcome>> = FuturesUnordered::new();
        loop {
            let next_completion = Box::pin(async {
                if running.is_empty() {
                    future::pending().await
                } else {
                    running.next().await.expect("FuturesUnordered non-empty")
                }
            });
            let tick = Box::pin(tokio::time::sleep(POLL_INTERVAL));

            select_biased! {
                outcome = next_completion.fuse() => {
                    self.drain_completion(outcome).await?;
                },
                _ = tick.fuse() => {
                    if self.running_handles.lock().len() < self.max_concurrent_jobs {
                        self.dispatch_next(&mut running).await?;
                    }
                },
            }
        }
    }

    /// Pops one item from `request`, moves it into `process`, and spawns an
    /// in-process task to run it, rather than an OS subprocess.
    async fn dispatch_next(&self, running: &mut FuturesUnordered<JoinHandle<JobOutcome>>) -> anyhow::Result<()> {
        let Some(serialized_request) = self.broker.pop(BrokerTarget::Request).await? else {
            return Ok(());
        };
        let request = match Request::deserialize(&serialized_request) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!("controller: dropping unparseable request: {e:#}");
                return Ok(());
            },
        };
        let fingerprint = request.fingerprint_hex();
        self.broker
            .add(BrokerTarget::Process, &fingerprint, &serialized_request)
            .await?;

        let cohort_resolver = self.cohort_resolver.clone();
        let data_source = self.data_source.clone();
        let metrics = self.metrics.clone();
        let aggregators = self.aggregators.clone();
        let timeout = self.job_timeout;
        let job_fingerprint = fingerprint.clone();

        let handle = tokio::spawn(async move {
            let payload = match tokio::time::timeout(
                timeout,
                worker::execute(&request, cohort_resolver.as_ref(), data_source.as_ref(), &metrics, &aggregators),
            )
            .await
            {
                Ok(payload) => payload,
                Err(_) => serde_json::json!({ "data": "job timed out" }),
            };
            JobOutcome {
                fingerprint: job_fingerprint,
                serialized_request,
                payload,
            }
        });
        self.running_handles.lock().insert(fingerprint, handle.abort_handle());
        running.push(handle);
        Ok(())
    }

    /// Moves a completed job's output from `process` to `response`.
    async fn drain_completion(&self, outcome: Result<JobOutcome, tokio::task::JoinError>) -> anyhow::Result<()> {
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => {
                // Already handled by `cancel`, which wrote the response entry itself.
                return Ok(());
            },
            Err(e) => {
                tracing::error!("controller: worker task panicked: {e:#}");
                return Ok(());
            },
        };
        self.running_handles.lock().remove(&outcome.fingerprint);
        self.broker.remove(BrokerTarget::Process, &outcome.fingerprint).await?;
        let value = response_entry(&outcome.serialized_request, &outcome.payload)?;
        self.broker.add(BrokerTarget::Response, &outcome.fingerprint, &value).await?;
        Ok(())
    }
}

fn response_entry(serialized_request: &str, payload: &serde_json::Value) -> anyhow::Result<String> {
    Ok(format!("{serialized_request}{RESPONSE_DELIMITER}{}", serde_json::to_string(payload)?))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use broker::FileBroker;
    use indexmap::{
        IndexMap,
        IndexSet,
    };
    use metric_registry::InMemoryDataSource;
    use tempfile::tempdir;

    use super::*;

    struct StubResolver;

    #[async_trait]
    impl CohortResolver for StubResolver {
        async fn resolve_name(&self, _name: &str) -> anyhow::Result<Option<u64>> {
            Ok(None)
        }

        async fn members(&self, _cohort: u64) -> anyhow::Result<IndexSet<u64>> {
            Ok(IndexSet::from([100]))
        }
    }

    fn sample_request() -> Request {
        let params = IndexMap::from([
            ("cohort_expression".to_string(), "1".to_string()),
            (
                "cohort_refresh_timestamp".to_string(),
                "2013-01-01T00:00:00Z".to_string(),
            ),
            ("metric".to_string(), "edit_count".to_string()),
        ]);
        Request::from_http(&params).unwrap()
    }

    fn controller(broker: Arc<dyn Broker>) -> Arc<Controller> {
        Arc::new(Controller::new(
            broker,
            Arc::new(StubResolver),
            Arc::new(InMemoryDataSource::default()),
            Arc::new(MetricRegistry::builtin()),
            Arc::new(AggregatorRegistry::builtin()),
        ))
    }

    #[tokio::test]
    async fn restart_recovery_fails_abandoned_jobs_pessimistically() {
        let dir = tempdir().unwrap();
        let broker: Arc<dyn Broker> = Arc::new(FileBroker::open(dir.path()).unwrap());
        let request = sample_request();
        let fingerprint = request.fingerprint_hex();
        broker
            .add(BrokerTarget::Process, &fingerprint, &request.serialize().unwrap())
            .await
            .unwrap();

        let controller = controller(broker.clone());
        controller.recover_on_startup().await.unwrap();

        assert!(!broker.is_item(BrokerTarget::Process, &fingerprint).await.unwrap());
        let response = broker.get(BrokerTarget::Response, &fingerprint).await.unwrap().unwrap();
        assert!(response.contains("abandoned"));
    }

    #[tokio::test]
    async fn cancel_removes_queued_job_and_writes_failure() {
        let dir = tempdir().unwrap();
        let broker: Arc<dyn Broker> = Arc::new(FileBroker::open(dir.path()).unwrap());
        let request = sample_request();
        let fingerprint = request.fingerprint_hex();
        broker
            .add(BrokerTarget::Request, &fingerprint, &request.serialize().unwrap())
            .await
            .unwrap();

        let controller = controller(broker.clone());
        assert!(controller.cancel(&fingerprint).await.unwrap());
        assert!(!broker.is_item(BrokerTarget::Request, &fingerprint).await.unwrap());
        let response = broker.get(BrokerTarget::Response, &fingerprint).await.unwrap().unwrap();
        assert!(response.contains("cancelled"));
    }

    #[tokio::test]
    async fn cancel_on_unknown_fingerprint_returns_false() {
        let dir = tempdir().unwrap();
        let broker: Arc<dyn Broker> = Arc::new(FileBroker::open(dir.path()).unwrap());
        let controller = controller(broker);
        assert!(!controller.cancel("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn dispatch_and_drain_moves_request_through_process_to_response() {
        let dir = tempdir().unwrap();
        let broker: Arc<dyn Broker> = Arc::new(FileBroker::open(dir.path()).unwrap());
        let request = sample_request();
        let fingerprint = request.fingerprint_hex();
        broker
            .add(BrokerTarget::Request, &fingerprint, &request.serialize().unwrap())
            .await
            .unwrap();

        let controller = controller(broker.clone());
        let mut running = FuturesUnordered::new();
        controller.dispatch_next(&mut running).await.unwrap();
        assert!(broker.is_item(BrokerTarget::Process, &fingerprint).await.unwrap());
        assert!(!broker.is_item(BrokerTarget::Request, &fingerprint).await.unwrap());

        let outcome = running.next().await.unwrap();
        controller.drain_completion(outcome).await.unwrap();
        assert!(!broker.is_item(BrokerTarget::Process, &fingerprint).await.unwrap());
        assert!(broker.is_item(BrokerTarget::Response, &fingerprint).await.unwrap());
    }
}
