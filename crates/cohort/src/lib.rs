//! Cohort-expression grammar and resolver interface.
//!
//! Database connectivity and SQL generation for cohort membership live
//! outside this crate — it only consumes a [`CohortResolver`], the external
//! collaborator boundary between the pipeline and storage.
use std::sync::LazyLock;

use async_trait::async_trait;
use errors::ErrorMetadata;
use indexmap::IndexSet;

/// Opaque unsigned user identifier.
pub type UserId = u64;

/// Numeric cohort identifier.
pub type CohortId = u64;

/// Translates a cohort name to its numeric ID, and a cohort ID to its
/// member user IDs. One implementation per storage backend; the pipeline
/// depends only on this trait.
#[async_trait]
pub trait CohortResolver: Send + Sync {
    /// Resolves a bare (non-numeric) cohort name to its ID. `Ok(None)` means
    /// the name is unknown, not an error.
    async fn resolve_name(&self, name: &str) -> anyhow::Result<Option<CohortId>>;

    /// Returns the de-duplicated, order-preserved member set of one cohort.
    /// An unknown cohort ID returns an empty set.
    async fn members(&self, cohort: CohortId) -> anyhow::Result<IndexSet<UserId>>;
}

/// A parsed cohort expression, ready for evaluation against a
/// [`CohortResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CohortExpression {
    /// OR-of-AND-groups of numeric cohort IDs, e.g. `1&2~3` parses to
    /// `[[1, 2], [3]]`.
    Numeric(Vec<Vec<CohortId>>),
    /// A bare name to resolve via [`CohortResolver::resolve_name`].
    Name(String),
}

static NUMERIC_EXPRESSION: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[0-9]+([&~][0-9]+)*$").expect("valid regex"));

/// Parses a raw cohort expression string against the grammar
/// `([0-9]+[&~])*[0-9]+`, with `&` binding tighter than `~`.
///
/// A string containing `&` or `~` must fully match the numeric grammar or
/// the expression is malformed. A bare token with no delimiter is either a
/// single numeric cohort ID or, failing that, a name to resolve.
pub fn parse_cohort_expression(expr: &str) -> anyhow::Result<CohortExpression> {
    if expr.is_empty() {
        return Err(bad_expression(expr).into());
    }
    if expr.contains('&') || expr.contains('~') {
        if !NUMERIC_EXPRESSION.is_match(expr) {
            return Err(bad_expression(expr).into());
        }
        return Ok(CohortExpression::Numeric(parse_numeric_groups(expr)));
    }
    if let Ok(id) = expr.parse::<CohortId>() {
        return Ok(CohortExpression::Numeric(vec![vec![id]]));
    }
    Ok(CohortExpression::Name(expr.to_string()))
}

fn parse_numeric_groups(expr: &str) -> Vec<Vec<CohortId>> {
    expr.split('~')
        .map(|group| {
            group
                .split('&')
                .map(|id| id.parse::<CohortId>().expect("validated by NUMERIC_EXPRESSION"))
                .collect()
        })
        .collect()
}

fn bad_expression(expr: &str) -> ErrorMetadata {
    ErrorMetadata::bad_request(
        "BadCohortExpression",
        format!("malformed cohort expression: {expr}"),
    )
}

/// Resolves a parsed expression to its member user IDs: intersection within
/// each AND-group, union across groups, first-seen order preserved, no
/// duplicates.
///
/// `all` is deliberately not handled here — it is reserved for the worker,
/// which expands it to "every user active in the request's time window"
/// rather than a stored cohort.
pub async fn resolve_cohort_expression(
    expr: &CohortExpression,
    resolver: &dyn CohortResolver,
) -> anyhow::Result<IndexSet<UserId>> {
    match expr {
        CohortExpression::Numeric(groups) => {
            let mut union = IndexSet::new();
            for group in groups {
                let mut iter = group.iter();
                let Some(&first) = iter.next() else {
                    continue;
                };
                let mut intersection = resolver.members(first).await?;
                for &id in iter {
                    let members = resolver.members(id).await?;
                    intersection.retain(|u| members.contains(u));
                }
                for user in intersection {
                    union.insert(user);
                }
            }
            Ok(union)
        },
        CohortExpression::Name(name) => match resolver.resolve_name(name).await? {
            Some(id) => resolver.members(id).await,
            None => {
                tracing::error!("cohort: unknown cohort name {name}");
                Ok(IndexSet::new())
            },
        },
    }
}
