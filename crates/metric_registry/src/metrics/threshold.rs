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

/// Whether a user's edit count within the window meets a configurable bar.
pub struct Threshold;

#[async_trait]
impl Metric for Threshold {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn header(&self) -> Vec<String> {
        vec!["user_id".to_string(), "meets_threshold".to_string()]
    }

    fn param_types(&self) -> IndexMap<String, ParamSpec> {
        IndexMap::from([("threshold".to_string(), ParamSpec {
            param_type: ParamType::Int,
            description: "Minimum edit count to count as meeting the threshold.",
            default: "1",
        })])
    }

    async fn process(
        &self,
        users: &[UserId],
        options: &MetricOptions<'_>,
        data_source: &dyn MetricDataSource,
    ) -> anyhow::Result<MetricOutput> {
        let threshold = options.int("threshold", 1);
        let mut rows = Vec::with_capacity(users.len());
        for &user_id in users {
            let activity = data_source
                .user_activity(user_id, options.start, options.end, options.project, options.namespace)
                .await?;
            rows.push(MetricRow {
                user_id,
                values: vec![serde_json::json!(activity.edit_count as i64 >= threshold)],
            });
        }
        Ok(MetricOutput {
            rows,
            datetime_start: options.start,
            datetime_end: options.end,
        })
    }
}
