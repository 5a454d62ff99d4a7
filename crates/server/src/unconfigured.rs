//! Placeholder implementations of the two external-collaborator seams this
//! core explicitly scopes out: cohort-membership SQL and the per-metric
//! data warehouse queries. A real deployment swaps these for a
//! database-backed `CohortResolver`/`MetricDataSource`; wiring one up is
//! left to the operator, not this crate.
use async_trait::async_trait;
use chrono::NaiveDateTime;
use cohort::{
    CohortId,
    CohortResolver,
    UserId,
};
use errors::ErrorMetadata;
use indexmap::IndexSet;
use metric_registry::{
    MetricDataSource,
    UserActivityWindow,
};

fn not_configured(what: &str) -> anyhow::Error {
    ErrorMetadata::not_found(
        "ExternalCollaboratorNotConfigured",
        format!("{what} requires a database-backed implementation, which this deployment has not configured"),
    )
    .into()
}

pub struct UnconfiguredCohortResolver;

#[async_trait]
impl CohortResolver for UnconfiguredCohortResolver {
    async fn resolve_name(&self, _name: &str) -> anyhow::Result<Option<CohortId>> {
        Err(not_configured("cohort name resolution"))
    }

    async fn members(&self, _cohort: CohortId) -> anyhow::Result<IndexSet<UserId>> {
        Err(not_configured("cohort membership lookup"))
    }
}

pub struct UnconfiguredDataSource;

#[async_trait]
impl MetricDataSource for UnconfiguredDataSource {
    async fn active_users(
        &self,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
        _project: &str,
    ) -> anyhow::Result<Vec<UserId>> {
        Err(not_configured("active-users lookup"))
    }

    async fn user_activity(
        &self,
        _user: UserId,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
        _project: &str,
        _namespace: Option<i64>,
    ) -> anyhow::Result<UserActivityWindow> {
        Err(not_configured("user activity lookup"))
    }

    async fn resolve_user_name(&self, _name: &str, _project: &str) -> anyhow::Result<Option<UserId>> {
        Err(not_configured("user name resolution"))
    }
}
