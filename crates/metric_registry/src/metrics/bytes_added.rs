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

/// Net bytes added to articles by a user within the window.
pub struct BytesAdded;

#[async_trait]
impl Metric for BytesAdded {
    fn name(&self) -> &'static str {
        "bytes_added"
    }

    fn header(&self) -> Vec<String> {
        vec!["user_id".to_string(), "bytes_added".to_string()]
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
                values: vec![serde_json::json!(activity.bytes_added)],
            });
        }
        Ok(MetricOutput {
            rows,
            datetime_start: options.start,
            datetime_end: options.end,
        })
    }
}
