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

/// Whether a newly registered account went on to make its first edit within
/// `t` minutes (https://meta.wikimedia.org/wiki/Research:Metrics/live_account).
/// -1 no edit in window, 0 edited but after `t` minutes, 1 edited within `t`.
pub struct LiveAccount;

#[async_trait]
impl Metric for LiveAccount {
    fn name(&self) -> &'static str {
        "live_account"
    }

    fn header(&self) -> Vec<String> {
        vec!["user_id".to_string(), "is_active_account".to_string()]
    }

    fn param_types(&self) -> IndexMap<String, ParamSpec> {
        IndexMap::from([("t".to_string(), ParamSpec {
            param_type: ParamType::Int,
            description: "The time in minutes until the threshold.",
            default: "60",
        })])
    }

    async fn process(
        &self,
        users: &[UserId],
        options: &MetricOptions<'_>,
        data_source: &dyn MetricDataSource,
    ) -> anyhow::Result<MetricOutput> {
        let threshold_minutes = options.int("t", 60);
        let mut rows = Vec::with_capacity(users.len());
        for &user_id in users {
            let activity = data_source
                .user_activity(user_id, options.start, options.end, options.project, options.namespace)
                .await?;
            let status: i64 = match (activity.registration_time, activity.edit_timestamps.first()) {
                (Some(registered), Some(first_edit)) => {
                    if (*first_edit - registered).num_minutes() <= threshold_minutes {
                        1
                    } else {
                        0
                    }
                },
                _ => -1,
            };
            rows.push(MetricRow {
                user_id,
                values: vec![serde_json::json!(status)],
            });
        }
        Ok(MetricOutput {
            rows,
            datetime_start: options.start,
            datetime_end: options.end,
        })
    }
}
