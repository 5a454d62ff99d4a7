use async_trait::async_trait;
use indexmap::IndexMap;

use crate::{
    data_source::{
        MetricDataSource,
        MetricOptions,
        UserId,
    },
    metric::{
        Metric,
        MetricOutput,
        MetricRow,
        ParamSpec,
        ParamType,
    },
};

/// How often a user's revisions have been reverted
/// (https://meta.wikimedia.org/wiki/Research:Metrics/revert_rate).
///
/// `look_ahead`/`look_back`/`t` bound the window checked for a revert after
/// each revision.
pub struct RevertRate;

#[async_trait]
impl Metric for RevertRate {
    fn name(&self) -> &'static str {
        "revert_rate"
    }

    fn header(&self) -> Vec<String> {
        vec![
            "user_id".to_string(),
            "is_reverted".to_string(),
            "revert_count".to_string(),
            "revision_count".to_string(),
        ]
    }

    fn param_types(&self) -> IndexMap<String, ParamSpec> {
        IndexMap::from([
            ("look_ahead".to_string(), ParamSpec {
                param_type: ParamType::Int,
                description: "Number of revisions to look ahead when computing revert.",
                default: "15",
            }),
            ("look_back".to_string(), ParamSpec {
                param_type: ParamType::Int,
                description: "Number of revisions to look back when computing revert.",
                default: "15",
            }),
            ("t".to_string(), ParamSpec {
                param_type: ParamType::Int,
                description: "Length of measurement period, in hours.",
                default: "168",
            }),
        ])
    }

    async fn process(
        &self,
        users: &[UserId],
        options: &MetricOptions<'_>,
        data_source: &dyn MetricDataSource,
    ) -> anyhow::Result<MetricOutput> {
        let mut rows = Vec::with_capacity(users.len());
        for &user_id in users {
            let activity = data_source
                .user_activity(user_id, options.start, options.end, options.project, options.namespace)
                .await?;
            rows.push(MetricRow {
                user_id,
                values: vec![
                    serde_json::json!(activity.revert_count > 0),
                    serde_json::json!(activity.revert_count),
                    serde_json::json!(activity.edit_count),
                ],
            });
        }
        Ok(MetricOutput {
            rows,
            datetime_start: options.start,
            datetime_end: options.end,
        })
    }
}
