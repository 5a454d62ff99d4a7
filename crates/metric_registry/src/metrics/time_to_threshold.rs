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

/// Minutes between registration and a user's `threshold`-th edit. `-1` if
/// the user never reached the threshold within the window.
pub struct TimeToThreshold;

#[async_trait]
impl Metric for TimeToThreshold {
    fn name(&self) -> &'static str {
        "time_to_threshold"
    }

    fn header(&self) -> Vec<String> {
        vec!["user_id".to_string(), "minutes_to_threshold".to_string()]
    }

    fn param_types(&self) -> IndexMap<String, ParamSpec> {
        IndexMap::from([("threshold".to_string(), ParamSpec {
            param_type: ParamType::Int,
            description: "Edit number (1-indexed) whose timestamp to measure against registration.",
            default: "1",
        })])
    }

    async fn process(
        &self,
        users: &[UserId],
        options: &MetricOptions<'_>,
        data_source: &dyn MetricDataSource,
    ) -> anyhow::Result<MetricOutput> {
        let threshold = options.int("threshold", 1).max(1) as usize;
        let mut rows = Vec::with_capacity(users.len());
        for &user_id in users {
            let activity = data_source
                .user_activity(user_id, options.start, options.end, options.project, options.namespace)
                .await?;
            let minutes = match (activity.registration_time, activity.edit_timestamps.get(threshold - 1)) {
                (Some(registered), Some(nth_edit)) => {
                    (*nth_edit - registered).num_minutes()
                },
                _ => -1,
            };
            rows.push(MetricRow {
                user_id,
                values: vec![serde_json::json!(minutes)],
            });
        }
        Ok(MetricOutput {
            rows,
            datetime_start: options.start,
            datetime_end: options.end,
        })
    }
}
