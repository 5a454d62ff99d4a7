//! Canonical request model, fingerprinting, and HTTP parameter parsing.
use std::fmt::Write as _;

use anyhow::Context;
use chrono::{
    DateTime,
    NaiveDateTime,
    Utc,
};
use errors::ErrorMetadata;
use indexmap::IndexMap;
use serde::{
    Deserialize,
    Serialize,
};
use sha1::{
    Digest,
    Sha1,
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DEFAULT_PROJECT: &str = "enwiki";
const DEFAULT_SLICE_HOURS: u32 = 24;

/// Separator between each field's name and value in a fingerprint entry,
/// and between the raw request half and the result payload in a `response`
/// broker entry.
pub const FINGERPRINT_SEPARATOR: &str = "--";

/// Delimiter the response handler splits on to recover the originating
/// request from a `response` target entry.
pub const RESPONSE_DELIMITER: &str = "<&>";

/// Canonical, order-preserving parameter record for one metrics request.
///
/// A closed, enumerated record rather than an open attribute bag: every
/// recognized option is a named field; only `metric_options` remains a
/// small open map for the handful of per-metric knobs (`look_ahead`,
/// `look_back`, `threshold`, `t`) the core does not need to interpret
/// itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    // Base fields: identifying. All three must be present for the request
    // to be valid.
    pub cohort_expression: String,
    pub cohort_refresh_timestamp: Option<DateTime<Utc>>,
    pub metric: String,

    // Query fields: modulating. `None` means "use the metric default".
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub slice_hours: Option<u32>,
    pub aggregator: Option<String>,
    pub project: Option<String>,
    pub namespace: Option<i64>,
    pub is_time_series: bool,
    pub is_user: bool,

    /// Bypasses the cache for this call. Deliberately excluded from the
    /// fingerprint.
    pub refresh: bool,

    /// Per-metric options the core passes through uninterpreted, in the
    /// order they were recognized.
    pub metric_options: IndexMap<String, String>,
}

impl Request {
    /// Builds a canonical `Request` from merged HTTP path and query
    /// parameters. Unrecognized keys are ignored; recognized keys are
    /// coerced and defaulted. The frontend is expected to have already
    /// merged the `{cohort}`/`{metric}` path segments into `cohort_expression`
    /// and `metric` before calling this.
    pub fn from_http(params: &IndexMap<String, String>) -> anyhow::Result<Self> {
        let cohort_expression = params.get("cohort_expression").cloned().unwrap_or_default();
        let metric = params.get("metric").cloned().unwrap_or_default();
        let cohort_refresh_timestamp = match params.get("cohort_refresh_timestamp") {
            Some(raw) => Some(parse_rfc3339(raw)?),
            None => None,
        };

        let start = params.get("start").map(|raw| parse_timestamp(raw)).transpose()?;
        let end = params.get("end").map(|raw| parse_timestamp(raw)).transpose()?;
        let slice_hours = match params.get("slice") {
            Some(raw) => Some(raw.parse::<u32>().with_context(|| {
                ErrorMetadata::bad_request("BadSlice", format!("`slice` must be an integer, got `{raw}`"))
            })?),
            None => Some(DEFAULT_SLICE_HOURS),
        };
        let aggregator = params.get("aggregator").cloned();
        let project = Some(
            params
                .get("project")
                .cloned()
                .unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
        );
        let namespace = params
            .get("namespace")
            .map(|raw| {
                raw.parse::<i64>().with_context(|| {
                    ErrorMetadata::bad_request(
                        "BadNamespace",
                        format!("`namespace` must be an integer, got `{raw}`"),
                    )
                })
            })
            .transpose()?;
        let is_time_series = parse_flag(params.get("time_series"));
        let is_user = parse_flag(params.get("is_user"));
        let refresh = parse_flag(params.get("refresh"));

        const KNOWN_KEYS: &[&str] = &[
            "cohort_expression",
            "metric",
            "cohort_refresh_timestamp",
            "start",
            "end",
            "slice",
            "aggregator",
            "project",
            "namespace",
            "time_series",
            "is_user",
            "refresh",
        ];
        let mut metric_options = IndexMap::new();
        for (key, value) in params {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                metric_options.insert(key.clone(), value.clone());
            }
        }

        Ok(Self {
            cohort_expression,
            cohort_refresh_timestamp,
            metric,
            start,
            end,
            slice_hours,
            aggregator,
            project,
            namespace,
            is_time_series,
            is_user,
            refresh,
            metric_options,
        })
    }

    /// `true` iff every base field is present; absence invalidates the request.
    pub fn has_all_base_fields(&self) -> bool {
        !self.cohort_expression.is_empty()
            && self.cohort_refresh_timestamp.is_some()
            && !self.metric.is_empty()
    }

    /// The unhashed fingerprint: the ordered `name--value` list of every
    /// base field and every *set* query field. Empty if any base field is
    /// missing — the empty list is a sentinel callers must treat as invalid.
    pub fn fingerprint_unhashed(&self) -> Vec<String> {
        if !self.has_all_base_fields() {
            return Vec::new();
        }
        let mut fields = Vec::new();
        fields.push(entry("cohort_expression", &self.cohort_expression));
        fields.push(entry(
            "cohort_refresh_timestamp",
            &self
                .cohort_refresh_timestamp
                .expect("checked by has_all_base_fields")
                .to_rfc3339(),
        ));
        fields.push(entry("metric", &self.metric));

        if let Some(start) = &self.start {
            fields.push(entry("start", &start.format(TIMESTAMP_FORMAT).to_string()));
        }
        if let Some(end) = &self.end {
            fields.push(entry("end", &end.format(TIMESTAMP_FORMAT).to_string()));
        }
        if let Some(slice_hours) = self.slice_hours {
            fields.push(entry("slice", &slice_hours.to_string()));
        }
        if let Some(aggregator) = &self.aggregator {
            fields.push(entry("aggregator", aggregator));
        }
        if let Some(project) = &self.project {
            fields.push(entry("project", project));
        }
        if let Some(namespace) = self.namespace {
            fields.push(entry("namespace", &namespace.to_string()));
        }
        if self.is_time_series {
            fields.push(entry("time_series", "true"));
        }
        if self.is_user {
            fields.push(entry("is_user", "true"));
        }
        for (key, value) in &self.metric_options {
            fields.push(entry(key, value));
        }
        // `refresh` is intentionally never included.
        fields
    }

    /// SHA-1 digest (20 bytes) of the unhashed fingerprint, joined with
    /// newlines so field boundaries cannot be confused with `--` inside a
    /// value.
    pub fn fingerprint_hashed(&self) -> [u8; 20] {
        let joined = self.fingerprint_unhashed().join("\n");
        let digest = Sha1::digest(joined.as_bytes());
        digest.into()
    }

    /// Hex-encoded hashed fingerprint, used as the broker key.
    pub fn fingerprint_hex(&self) -> String {
        let bytes = self.fingerprint_hashed();
        let mut hex = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            let _ = write!(hex, "{byte:02x}");
        }
        hex
    }

    /// Stable JSON round-trip so the request can travel through a broker
    /// entry's value and back.
    pub fn serialize(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn deserialize(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Reconstructs a `/cohorts/{cohort}/{metric}?...` URL from a cache entry's
/// unhashed fingerprint, for the `/all_requests` listing. `cohort_expression`
/// and `metric` become path segments; everything else becomes a query
/// parameter in fingerprint order.
pub fn build_url_from_unhashed_fingerprint(fields: &[String]) -> String {
    let mut cohort_expression = String::new();
    let mut metric = String::new();
    let mut query = Vec::new();
    for field in fields {
        let Some((name, value)) = field.split_once(FINGERPRINT_SEPARATOR) else {
            continue;
        };
        match name {
            "cohort_expression" => cohort_expression = value.to_string(),
            "metric" => metric = value.to_string(),
            other => query.push(format!("{other}={}", value.replace(' ', "%20"))),
        }
    }
    let mut url = format!("/cohorts/{cohort_expression}/{metric}");
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query.join("&"));
    }
    url
}

fn entry(name: &str, value: &str) -> String {
    format!("{name}{FINGERPRINT_SEPARATOR}{value}")
}

fn parse_timestamp(raw: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).with_context(|| {
        ErrorMetadata::bad_request(
            "BadTimestamp",
            format!("expected `{TIMESTAMP_FORMAT}`, got `{raw}`"),
        )
    })
}

fn parse_rfc3339(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| {
            ErrorMetadata::bad_request("BadTimestamp", format!("expected RFC3339, got `{raw}`"))
        })
}

fn parse_flag(raw: Option<&String>) -> bool {
    matches!(raw.map(String::as_str), Some("" | "true" | "1" | "yes"))
}
