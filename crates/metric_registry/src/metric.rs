//! Uniform metric interface: `header()`, `process(users, options)`,
//! `datetime_start`/`datetime_end`, and a declared parameter schema.
use async_trait::async_trait;
use chrono::NaiveDateTime;
use indexmap::IndexMap;

use crate::data_source::{
    MetricDataSource,
    MetricOptions,
    UserId,
};

/// One output row: a user ID plus its value columns
/// (`{user_id -> row_tail}` for raw requests).
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub user_id: UserId,
    pub values: Vec<serde_json::Value>,
}

/// The result of one `Metric::process` call.
pub struct MetricOutput {
    pub rows: Vec<MetricRow>,
    pub datetime_start: NaiveDateTime,
    pub datetime_end: NaiveDateTime,
}

/// The type a declared parameter coerces to, for documentation and for the
/// frontend to validate against before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Int,
    Bool,
    Str,
}

/// One entry of a metric's declared parameter schema (`_param_types` in the
/// original).
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub param_type: ParamType,
    pub description: &'static str,
    pub default: &'static str,
}

/// A named computation over a user set, returning rows with a declared
/// header (GLOSSARY). Implementations are pure with respect to their
/// `MetricDataSource` — two calls with the same users/options/data source
/// produce the same rows.
#[async_trait]
pub trait Metric: Send + Sync {
    fn name(&self) -> &'static str;

    fn header(&self) -> Vec<String>;

    /// Parameters this metric recognizes beyond the common window/project/
    /// namespace options every metric receives.
    fn param_types(&self) -> IndexMap<String, ParamSpec> {
        IndexMap::new()
    }

    async fn process(
        &self,
        users: &[UserId],
        options: &MetricOptions<'_>,
        data_source: &dyn MetricDataSource,
    ) -> anyhow::Result<MetricOutput>;
}
