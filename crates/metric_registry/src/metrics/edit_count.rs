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

/// Number of edits a user made within the window. The simplest metric; a
/// direct read of `UserActivityWindow::edit_count`.
pub struct EditCount;

#[async_trait]
impl Metric for EditCount {
    fn name(&self) -> &'static str {
        "edit_count"
    }

    fn header(&self) -> Vec<String> {
        vec!["user_id".to_string(), "edit_count".to_string()]
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
                values: vec![serde_json::json!(activity.edit_count)],
            });
        }
        Ok(MetricOutput {
            rows,
            datetime_start: options.start,
            datetime_end: options.end,
        })
    }
}
