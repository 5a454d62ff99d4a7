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

/// Whether a user was still editing at least `t` days after registration.
pub struct Survival;

#[async_trait]
impl Metric for Survival {
    fn name(&self) -> &'static str {
        "survival"
    }

    fn header(&self) -> Vec<String> {
        vec!["user_id".to_string(), "survived".to_string()]
    }

    fn param_types(&self) -> IndexMap<String, ParamSpec> {
        IndexMap::from([("t".to_string(), ParamSpec {
            param_type: ParamType::Int,
            description: "Days after registration a surviving user must still be editing.",
            default: "30",
        })])
    }

    async fn process(
        &self,
        users: &[UserId],
        options: &MetricOptions<'_>,
        data_source: &dyn MetricDataSource,
    ) -> anyhow::Result<MetricOutput> {
        let survival_days = options.int("t", 30);
        let mut rows = Vec::with_capacity(users.len());
        for &user_id in users {
            let activity = data_source
                .user_activity(user_id, options.start, options.end, options.project, options.namespace)
                .await?;
            let survived = match activity.registration_time {
                Some(registered) => activity
                    .edit_timestamps
                    .iter()
                    .any(|edit| (*edit - registered).num_days() >= survival_days),
                None => false,
            };
            rows.push(MetricRow {
                user_id,
                values: vec![serde_json::json!(survived)],
            });
        }
        Ok(MetricOutput {
            rows,
            datetime_start: options.start,
            datetime_end: options.end,
        })
    }
}
