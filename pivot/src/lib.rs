pub mod aggregate;
pub mod config;
pub mod elastic;
pub mod error;
pub mod query;

pub use aggregate::{AggregateResult, Aggregation, Aggregator, Axis, MetricFunction};
pub use config::Config;
pub use error::{Error, Result};
pub use query::{Filter, Filters, Queries};
