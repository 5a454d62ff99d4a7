use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    metric::Metric,
    metrics,
};

/// Name-keyed lookup over registered metrics, standing in for dynamic
/// dispatch by metric name.
pub struct MetricRegistry {
    metrics: IndexMap<&'static str, Arc<dyn Metric>>,
}

impl MetricRegistry {
    pub fn builtin() -> Self {
        let all: Vec<Arc<dyn Metric>> = vec![
            Arc::new(metrics::EditCount),
            Arc::new(metrics::RevertRate),
            Arc::new(metrics::BytesAdded),
            Arc::new(metrics::TimeToThreshold),
            Arc::new(metrics::Blocks),
            Arc::new(metrics::LiveAccount),
            Arc::new(metrics::Survival),
            Arc::new(metrics::Threshold),
            Arc::new(metrics::NamespaceOfEdits),
        ];
        let mut metrics = IndexMap::new();
        for metric in all {
            metrics.insert(metric.name(), metric);
        }
        Self { metrics }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Metric>> {
        self.metrics.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.metrics.keys().copied()
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
