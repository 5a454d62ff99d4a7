use async_trait::async_trait;

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
    },
};

/// Whether a user has been blocked or banned, via the logging table.
pub struct Blocks;

#[async_trait]
impl Metric for Blocks {
    fn name(&self) -> &'static str {
        "blocks"
    }

    fn header(&self) -> Vec<String> {
        vec!["user_id".to_string(), "is_blocked".to_string(), "is_banned".to_string()]
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
                values: vec![serde_json::json!(activity.blocked), serde_json::json!(activity.banned)],
            });
        }
        Ok(MetricOutput {
            rows,
            datetime_start: options.start,
            datetime_end: options.end,
        })
    }
}
