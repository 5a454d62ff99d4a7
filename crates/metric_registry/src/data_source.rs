//! The external-collaborator seam metrics call into: database connectivity
//! and SQL generation live behind this trait, never inside a metric.
use async_trait::async_trait;
use chrono::{
    NaiveDate,
    NaiveDateTime,
};
use indexmap::IndexMap;
use request::Request;

pub type UserId = u64;

/// Everything a metric needs to know about one user's activity within a
/// measurement window. A single fetch rather than one call per metric
/// concern, so a data source can join the revision/logging tables once per
/// user rather than once per metric.
#[derive(Debug, Clone, Default)]
pub struct UserActivityWindow {
    pub edit_count: u64,
    pub bytes_added: i64,
    pub revert_count: u64,
    pub registration_time: Option<NaiveDateTime>,
    /// Every edit timestamp in the window, ascending.
    pub edit_timestamps: Vec<NaiveDateTime>,
    /// Edit counts broken down by MediaWiki namespace ID.
    pub namespace_edit_counts: IndexMap<i64, u64>,
    pub blocked: bool,
    pub banned: bool,
}

/// Database connectivity and SQL generation for metric computation. The
/// core depends only on this trait.
#[async_trait]
pub trait MetricDataSource: Send + Sync {
    /// Every user active on `project` within `[start, end]` — backs the
    /// reserved `all` cohort expansion.
    async fn active_users(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        project: &str,
    ) -> anyhow::Result<Vec<UserId>>;

    async fn user_activity(
        &self,
        user: UserId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        project: &str,
        namespace: Option<i64>,
    ) -> anyhow::Result<UserActivityWindow>;

    /// Resolves `is_user`'s bare name to a single user ID, `Ok(None)` if no
    /// such user exists.
    async fn resolve_user_name(&self, name: &str, project: &str) -> anyhow::Result<Option<UserId>>;
}

/// In-memory `MetricDataSource` for tests; a real implementation backed by
/// the replica databases is left to the deployment.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDataSource {
    pub activity: IndexMap<UserId, UserActivityWindow>,
    pub active_in_window: Vec<UserId>,
    pub user_names: IndexMap<String, UserId>,
}

#[async_trait]
impl MetricDataSource for InMemoryDataSource {
    async fn active_users(
        &self,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
        _project: &str,
    ) -> anyhow::Result<Vec<UserId>> {
        Ok(self.active_in_window.clone())
    }

    async fn user_activity(
        &self,
        user: UserId,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
        _project: &str,
        _namespace: Option<i64>,
    ) -> anyhow::Result<UserActivityWindow> {
        Ok(self.activity.get(&user).cloned().unwrap_or_default())
    }

    async fn resolve_user_name(&self, name: &str, _project: &str) -> anyhow::Result<Option<UserId>> {
        Ok(self.user_names.get(name).copied())
    }
}

/// Parameters recognized by exactly one metric (`look_ahead`, `look_back`,
/// `threshold`, `t`), plus the window/project/namespace every metric sees
/// regardless of kind.
pub struct MetricOptions<'a> {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub project: &'a str,
    pub namespace: Option<i64>,
    extra: &'a IndexMap<String, String>,
}

/// 1970-01-01T00:00:00, used when a request omits `start`/`end` entirely —
/// metrics still need a concrete window to pass to the data source.
fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .expect("valid date")
        .and_hms_opt(0, 0, 0)
        .expect("valid time")
}

impl<'a> MetricOptions<'a> {
    pub fn from_request(request: &'a Request) -> Self {
        Self {
            start: request.start.unwrap_or_else(epoch),
            end: request.end.unwrap_or_else(epoch),
            project: request.project.as_deref().unwrap_or("enwiki"),
            namespace: request.namespace,
            extra: &request.metric_options,
        }
    }

    pub fn int(&self, key: &str, default: i64) -> i64 {
        self.extra
            .get(key)
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or(default)
    }
}
