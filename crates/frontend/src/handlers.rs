//! One handler per HTTP surface entry.
use axum::{
    extract::{
        Path,
        Query,
        State,
    },
    response::IntoResponse,
    Json,
};
use broker::BrokerTarget;
use controller::JobState;
use errors::ErrorMetadata;
use indexmap::IndexMap;
use request::{
    build_url_from_unhashed_fingerprint,
    Request,
};
use serde_json::json;

use crate::{
    errors::HttpResponseError,
    state::AppState,
};

/// `GET /cohorts/{cohort}/{metric}` — build the request, check the cache,
/// then `request`, then `process`, enqueueing only if none of those
/// already cover it.
pub async fn get_cohort_metric(
    Path((cohort, metric)): Path<(String, String)>,
    Query(mut params): Query<IndexMap<String, String>>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, HttpResponseError> {
    params.insert("cohort_expression".to_string(), cohort);
    params.insert("metric".to_string(), metric);
    let request = Request::from_http(&params)?;
    if !request.has_all_base_fields() {
        return Err(ErrorMetadata::bad_request(
            "BadRequest",
            "cohort_expression, cohort_refresh_timestamp, and metric are all required",
        )
        .into());
    }

    let fingerprint = request.fingerprint_hex();

    if !request.refresh {
        if let Some(payload) = state.cache.get(&request).await? {
            return Ok(Json(payload));
        }
    }

    if state.broker.is_item(BrokerTarget::Request, &fingerprint).await? {
        return Ok(Json(status_page("queued", &fingerprint)));
    }
    if state.broker.is_item(BrokerTarget::Process, &fingerprint).await? {
        return Ok(Json(status_page("running", &fingerprint)));
    }

    let serialized = request.serialize()?;
    state
        .broker
        .add(BrokerTarget::Request, &fingerprint, &serialized)
        .await?;
    Ok(Json(status_page("accepted", &fingerprint)))
}

fn status_page(status: &str, fingerprint: &str) -> serde_json::Value {
    json!({ "status": status, "fingerprint": fingerprint })
}

/// `GET /all_requests` — cached fingerprints rendered back as URLs.
pub async fn all_requests(State(state): State<AppState>) -> Result<impl IntoResponse, HttpResponseError> {
    let items = state.cache.items().await?;
    let requests: Vec<String> = items
        .into_iter()
        .map(|(_, entry)| build_url_from_unhashed_fingerprint(&entry.unhashed_fingerprint))
        .collect();
    Ok(Json(json!({ "requests": requests })))
}

/// `GET /job_queue` — entries across `request`/`process` with state labels.
pub async fn job_queue(State(state): State<AppState>) -> Result<impl IntoResponse, HttpResponseError> {
    let states = state.controller.job_states().await?;
    let jobs: Vec<serde_json::Value> = states
        .into_iter()
        .map(|(fingerprint, job_state)| {
            let label = match job_state {
                JobState::Queued => "queued",
                JobState::Running => "running",
            };
            json!({ "fingerprint": fingerprint, "state": label })
        })
        .collect();
    Ok(Json(json!({ "jobs": jobs })))
}

/// `DELETE /job_queue/{fingerprint}` — admin cancel.
pub async fn cancel_job(
    Path(fingerprint): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, HttpResponseError> {
    let cancelled = state.controller.cancel(&fingerprint).await?;
    if !cancelled {
        return Err(ErrorMetadata::not_found(
            "JobNotFound",
            format!("no queued or running job with fingerprint {fingerprint}"),
        )
        .into());
    }
    Ok(Json(json!({ "cancelled": true, "fingerprint": fingerprint })))
}

/// `GET /healthz` — touches the broker to confirm the durable store backing
/// every other endpoint is reachable.
pub async fn healthz(State(state): State<AppState>) -> Result<impl IntoResponse, HttpResponseError> {
    state.broker.get_keys(BrokerTarget::Cache).await?;
    Ok(Json(json!({ "status": "ok" })))
}
