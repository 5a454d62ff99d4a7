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

/// Edit count within a single namespace; `options.namespace` selects which
/// one (defaults to the main namespace, `0`).
pub struct NamespaceOfEdits;

#[async_trait]
impl Metric for NamespaceOfEdits {
    fn name(&self) -> &'static str {
        "namespace_of_edits"
    }

    fn header(&self) -> Vec<String> {
        vec!["user_id".to_string(), "namespace".to_string(), "edit_count".to_string()]
    }

    async fn process(
        &self,
        users: &[UserId],
        options: &MetricOptions<'_>,
        data_source: &dyn MetricDataSource,
    ) -> anyhow::Result<MetricOutput> {
        let namespace = options.namespace.unwrap_or(0);
        let mut rows = Vec::with_capacity(users.len());
        for &user_id in users {
            let activity = data_source
                .user_activity(user_id, options.start, options.end, options.project, options.namespace)
                .await?;
            let count = activity.namespace_edit_counts.get(&namespace).copied().unwrap_or(0);
            rows.push(MetricRow {
                user_id,
                values: vec![serde_json::json!(namespace), serde_json::json!(count)],
            });
        }
        Ok(MetricOutput {
            rows,
            datetime_start: options.start,
            datetime_end: options.end,
        })
    }
}
