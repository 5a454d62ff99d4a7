//! Uniform metric/aggregator interface plus nine concrete metrics and a
//! handful of aggregators, registered by name so the pipeline never needs
//! to know a metric's concrete type.
pub mod aggregator;
pub mod data_source;
pub mod metric;
pub mod metrics;
pub mod registry;

pub use aggregator::{
    Aggregator,
    AggregatorRegistry,
};
pub use data_source::{
    InMemoryDataSource,
    MetricDataSource,
    MetricOptions,
    UserActivityWindow,
    UserId,
};
pub use metric::{
    Metric,
    MetricOutput,
    MetricRow,
    ParamSpec,
    ParamType,
};
pub use registry::MetricRegistry;
