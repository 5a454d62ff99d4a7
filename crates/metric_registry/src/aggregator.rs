//! Aggregator interface: a named function, with a declared output header,
//! that collapses a metric's per-user rows into one summary row for
//! aggregate and time-series requests.
use indexmap::IndexMap;

use crate::metric::MetricRow;

pub trait Aggregator: Send + Sync {
    fn name(&self) -> &'static str;

    fn header(&self) -> Vec<String>;

    /// Collapses `rows` (as produced by a metric sharing the same header)
    /// into one summary row. `value_index` selects which column of the
    /// metric's row tail to aggregate over — by convention the first
    /// numeric column after `user_id`.
    fn apply(&self, rows: &[MetricRow], value_index: usize) -> anyhow::Result<Vec<serde_json::Value>>;
}

fn numeric_column(rows: &[MetricRow], value_index: usize) -> Vec<f64> {
    rows.iter()
        .filter_map(|row| row.values.get(value_index))
        .filter_map(|value| value.as_f64().or_else(|| value.as_bool().map(|b| b as i64 as f64)))
        .collect()
}

pub struct SumAggregator;

impl Aggregator for SumAggregator {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn header(&self) -> Vec<String> {
        vec!["sum".to_string()]
    }

    fn apply(&self, rows: &[MetricRow], value_index: usize) -> anyhow::Result<Vec<serde_json::Value>> {
        let sum: f64 = numeric_column(rows, value_index).into_iter().sum();
        Ok(vec![serde_json::json!(sum)])
    }
}

pub struct MeanAggregator;

impl Aggregator for MeanAggregator {
    fn name(&self) -> &'static str {
        "mean"
    }

    fn header(&self) -> Vec<String> {
        vec!["mean".to_string()]
    }

    fn apply(&self, rows: &[MetricRow], value_index: usize) -> anyhow::Result<Vec<serde_json::Value>> {
        let values = numeric_column(rows, value_index);
        let mean = if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };
        Ok(vec![serde_json::json!(mean)])
    }
}

pub struct CountAggregator;

impl Aggregator for CountAggregator {
    fn name(&self) -> &'static str {
        "count"
    }

    fn header(&self) -> Vec<String> {
        vec!["count".to_string()]
    }

    fn apply(&self, rows: &[MetricRow], _value_index: usize) -> anyhow::Result<Vec<serde_json::Value>> {
        Ok(vec![serde_json::json!(rows.len())])
    }
}

/// Name-keyed lookup over the registered aggregators, mirroring
/// `MetricRegistry`'s registry-over-dynamic-dispatch shape.
pub struct AggregatorRegistry {
    aggregators: IndexMap<&'static str, Box<dyn Aggregator>>,
}

impl AggregatorRegistry {
    pub fn builtin() -> Self {
        let mut aggregators: IndexMap<&'static str, Box<dyn Aggregator>> = IndexMap::new();
        aggregators.insert("sum", Box::new(SumAggregator));
        aggregators.insert("mean", Box::new(MeanAggregator));
        aggregators.insert("count", Box::new(CountAggregator));
        Self { aggregators }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Aggregator> {
        self.aggregators.get(name).map(|a| a.as_ref())
    }
}

impl Default for AggregatorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<MetricRow> {
        vec![
            MetricRow { user_id: 1, values: vec![serde_json::json!(2)] },
            MetricRow { user_id: 2, values: vec![serde_json::json!(4)] },
            MetricRow { user_id: 3, values: vec![serde_json::json!(6)] },
        ]
    }

    #[test]
    fn sum_and_mean_and_count() {
        let rows = rows();
        assert_eq!(SumAggregator.apply(&rows, 0).unwrap(), vec![serde_json::json!(12.0)]);
        assert_eq!(MeanAggregator.apply(&rows, 0).unwrap(), vec![serde_json::json!(4.0)]);
        assert_eq!(CountAggregator.apply(&rows, 0).unwrap(), vec![serde_json::json!(3)]);
    }

    #[test]
    fn registry_resolves_by_name() {
        let registry = AggregatorRegistry::builtin();
        assert!(registry.get("sum").is_some());
        assert!(registry.get("bogus").is_none());
    }
}
