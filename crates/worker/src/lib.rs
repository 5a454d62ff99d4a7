//! Executes one request end to end: resolves cohort users, dispatches to
//! the correct metric, optionally aggregates or time-slices, and emits a
//! result payload.
use chrono::{
    Duration,
    NaiveDateTime,
};
use cohort::{
    parse_cohort_expression,
    resolve_cohort_expression,
    CohortResolver,
};
use errors::ErrorMetadata;
use futures::{
    stream,
    StreamExt,
};
use indexmap::IndexMap;
use metric_registry::{
    Aggregator,
    AggregatorRegistry,
    MetricDataSource,
    MetricOptions,
    MetricOutput,
    MetricRegistry,
    UserId,
};
use request::Request;

/// The reserved cohort-expression literal meaning "every user active in the
/// request's time window". Resolved here, not by the cohort resolver.
pub const ALL_COHORT: &str = "all";

/// Maximum broker transfer block, kept as a documented wire-format constant
/// for chunked IPC transports. Payloads never leave process as in-memory
/// `String`s, so no code here actually chunks against it; it exists only so
/// a future broker transport over a real IPC boundary has a concrete number
/// to chunk at.
pub const MAX_BLOCK_SIZE: usize = 5000;

/// Bucket-concurrency bounds for time-series requests:
/// `clamp(ceil(buckets / 10), 1, 5)`.
const INTERVALS_PER_THREAD: i64 = 10;
const MAX_BUCKET_WORKERS: usize = 5;

/// Executes one request and always returns a payload — metric and lookup
/// failures are embedded in the JSON as `{"data": error_text}` rather than
/// propagated, so the controller never hangs on a bad job.
pub async fn execute(
    request: &Request,
    cohort_resolver: &dyn CohortResolver,
    data_source: &dyn MetricDataSource,
    metrics: &MetricRegistry,
    aggregators: &AggregatorRegistry,
) -> serde_json::Value {
    match execute_inner(request, cohort_resolver, data_source, metrics, aggregators).await {
        Ok(payload) => payload,
        Err(e) => envelope(request, serde_json::json!({ "data": e.to_string() })),
    }
}

async fn execute_inner(
    request: &Request,
    cohort_resolver: &dyn CohortResolver,
    data_source: &dyn MetricDataSource,
    metrics: &MetricRegistry,
    aggregators: &AggregatorRegistry,
) -> anyhow::Result<serde_json::Value> {
    let options = MetricOptions::from_request(request);

    let users: Vec<UserId> = if request.is_user {
        let user_id = data_source
            .resolve_user_name(&request.cohort_expression, options.project)
            .await?
            .ok_or_else(|| {
                ErrorMetadata::not_found(
                    "UserNotFound",
                    format!("no user named {}", request.cohort_expression),
                )
            })?;
        vec![user_id]
    } else if request.cohort_expression == ALL_COHORT {
        data_source
            .active_users(options.start, options.end, options.project)
            .await
            .map_err(|e| {
                anyhow::Error::new(ErrorMetadata::not_found(
                    "UserLookupFailed",
                    format!("active-users lookup failed: {e}"),
                ))
            })?
    } else {
        let expr = parse_cohort_expression(&request.cohort_expression)?;
        let resolved = resolve_cohort_expression(&expr, cohort_resolver).await?;
        resolved.into_iter().collect()
    };

    let metric = metrics.get(&request.metric).ok_or_else(|| {
        ErrorMetadata::bad_request("UnknownMetric", format!("no metric named {}", request.metric))
    })?;

    let data = if request.is_time_series {
        let slice_hours = request.slice_hours.unwrap_or(24).max(1) as i64;
        let buckets = bucket_bounds(options.start, options.end, slice_hours);
        let worker_count = ((buckets.len() as i64 + INTERVALS_PER_THREAD - 1) / INTERVALS_PER_THREAD)
            .clamp(1, MAX_BUCKET_WORKERS as i64) as usize;

        let aggregator_name = request.aggregator.as_deref().ok_or_else(|| {
            ErrorMetadata::bad_request("BadRequest", "time_series requests require an aggregator")
        })?;
        let aggregator = aggregators.get(aggregator_name).ok_or_else(|| {
            ErrorMetadata::bad_request("BadRequest", format!("no aggregator named {aggregator_name}"))
        })?;

        let bucket_rows: Vec<(NaiveDateTime, anyhow::Result<MetricOutput>)> = stream::iter(buckets)
            .map(|(bucket_start, bucket_end)| {
                let mut bucket_options = MetricOptions::from_request(request);
                bucket_options.start = bucket_start;
                bucket_options.end = bucket_end;
                let metric = metric.clone();
                async move {
                    let output = metric.process(&users, &bucket_options, data_source).await;
                    (bucket_start, output)
                }
            })
            .buffer_unordered(worker_count)
            .collect()
            .await;

        let mut series = IndexMap::new();
        for (bucket_start, output) in bucket_rows {
            let output = output?;
            let agg_row = aggregator.apply(&output.rows, 0)?;
            series.insert(bucket_start.format("%Y-%m-%d %H:%M:%S").to_string(), agg_row);
        }
        let mut header = vec!["timestamp".to_string()];
        header.extend(aggregator.header());
        serde_json::json!({ "header": header, "data": series })
    } else if let Some(aggregator_name) = &request.aggregator {
        let aggregator = aggregators.get(aggregator_name).ok_or_else(|| {
            ErrorMetadata::bad_request("BadRequest", format!("no aggregator named {aggregator_name}"))
        })?;
        let output = metric.process(&users, &options, data_source).await?;
        let agg_row = aggregator.apply(&output.rows, 0)?;
        serde_json::json!({ "header": aggregator.header(), "data": agg_row })
    } else {
        let output = metric.process(&users, &options, data_source).await?;
        let mut rows = IndexMap::new();
        for row in output.rows {
            rows.insert(row.user_id.to_string(), row.values.to_vec());
        }
        serde_json::json!({ "header": metric.header(), "data": rows })
    };

    Ok(envelope(request, data))
}

/// Wraps metric output with the request's identifying metadata to form the
/// response JSON shape for a completed request.
fn envelope(request: &Request, data: serde_json::Value) -> serde_json::Value {
    let (header, inner_data) = match data {
        serde_json::Value::Object(mut map) => (map.remove("header"), map.remove("data")),
        other => (None, Some(other)),
    };
    serde_json::json!({
        "header": header,
        "cohort_expr": request.cohort_expression,
        "cohort_gen_timestamp": request.cohort_refresh_timestamp,
        "metric": request.metric,
        "time_series": request.is_time_series,
        "aggregator": request.aggregator,
        "start": request.start.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
        "end": request.end.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
        "data": inner_data,
    })
}

/// Splits `[start, end]` into fixed-width buckets of `slice_hours`,
/// truncating the final bucket at `end`.
fn bucket_bounds(start: NaiveDateTime, end: NaiveDateTime, slice_hours: i64) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let mut buckets = Vec::new();
    let mut cursor = start;
    let step = Duration::hours(slice_hours);
    while cursor < end {
        let bucket_end = (cursor + step).min(end);
        buckets.push((cursor, bucket_end));
        cursor = bucket_end;
    }
    buckets
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use indexmap::IndexSet;
    use metric_registry::{
        InMemoryDataSource,
        UserActivityWindow,
    };

    use super::*;

    struct StubResolver;

    #[async_trait]
    impl CohortResolver for StubResolver {
        async fn resolve_name(&self, _name: &str) -> anyhow::Result<Option<u64>> {
            Ok(None)
        }

        async fn members(&self, cohort: u64) -> anyhow::Result<IndexSet<u64>> {
            Ok(match cohort {
                1 => IndexSet::from([100, 200]),
                _ => IndexSet::new(),
            })
        }
    }

    fn params(extra: &[(&str, &str)]) -> IndexMap<String, String> {
        let mut params = IndexMap::from([
            ("cohort_expression".to_string(), "1".to_string()),
            (
                "cohort_refresh_timestamp".to_string(),
                "2013-01-01T00:00:00Z".to_string(),
            ),
            ("metric".to_string(), "edit_count".to_string()),
            ("start".to_string(), "2013-01-01 00:00:00".to_string()),
            ("end".to_string(), "2013-01-08 00:00:00".to_string()),
        ]);
        for (key, value) in extra {
            params.insert(key.to_string(), value.to_string());
        }
        params
    }

    #[tokio::test]
    async fn raw_request_emits_user_keyed_rows() {
        let request = Request::from_http(&params(&[])).unwrap();
        let data_source = InMemoryDataSource {
            activity: IndexMap::from([
                (100, UserActivityWindow { edit_count: 18, ..Default::default() }),
                (200, UserActivityWindow { edit_count: 4, ..Default::default() }),
            ]),
            ..Default::default()
        };
        let payload = execute(
            &request,
            &StubResolver,
            &data_source,
            &MetricRegistry::builtin(),
            &AggregatorRegistry::builtin(),
        )
        .await;
        assert_eq!(payload["data"]["100"], serde_json::json!([18]));
        assert_eq!(payload["data"]["200"], serde_json::json!([4]));
        assert_eq!(payload["metric"], serde_json::json!("edit_count"));
    }

    #[tokio::test]
    async fn aggregate_request_applies_aggregator() {
        let request = Request::from_http(&params(&[("aggregator", "sum")])).unwrap();
        let data_source = InMemoryDataSource {
            activity: IndexMap::from([
                (100, UserActivityWindow { edit_count: 18, ..Default::default() }),
                (200, UserActivityWindow { edit_count: 4, ..Default::default() }),
            ]),
            ..Default::default()
        };
        let payload = execute(
            &request,
            &StubResolver,
            &data_source,
            &MetricRegistry::builtin(),
            &AggregatorRegistry::builtin(),
        )
        .await;
        assert_eq!(payload["data"], serde_json::json!([22.0]));
    }

    #[tokio::test]
    async fn unknown_metric_becomes_error_payload_not_panic() {
        let request = Request::from_http(&params(&[("metric".into(), "does_not_exist")])).unwrap();
        let data_source = InMemoryDataSource::default();
        let payload = execute(
            &request,
            &StubResolver,
            &data_source,
            &MetricRegistry::builtin(),
            &AggregatorRegistry::builtin(),
        )
        .await;
        assert!(payload["data"].as_str().unwrap().contains("does_not_exist"));
    }

    #[tokio::test]
    async fn all_cohort_invokes_active_users_query() {
        let mut raw = params(&[]);
        raw.insert("cohort_expression".to_string(), ALL_COHORT.to_string());
        let request = Request::from_http(&raw).unwrap();
        let data_source = InMemoryDataSource {
            active_in_window: vec![100, 200],
            activity: IndexMap::from([
                (100, UserActivityWindow { edit_count: 1, ..Default::default() }),
                (200, UserActivityWindow { edit_count: 2, ..Default::default() }),
            ]),
            ..Default::default()
        };
        let payload = execute(
            &request,
            &StubResolver,
            &data_source,
            &MetricRegistry::builtin(),
            &AggregatorRegistry::builtin(),
        )
        .await;
        assert_eq!(payload["data"]["100"], serde_json::json!([1]));
        assert_eq!(payload["data"]["200"], serde_json::json!([2]));
    }

    #[test]
    fn bucket_bounds_truncates_final_bucket() {
        let start = NaiveDate::from_ymd_opt(2013, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let end = start + Duration::hours(30);
        let buckets = bucket_bounds(start, end, 24);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[1].1, end);
    }
}
