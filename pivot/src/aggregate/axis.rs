//! Aggregation axes and metric specifications
//!
//! An [`Axis`] is an unbound grouping dimension; binding it to an index set
//! resolves its field type once and fixes the bucketing strategy. The same
//! split applies to metric [`Aggregation`]s, which only need the type to
//! decode date-valued results.

use crate::aggregate::intervals::IntervalCodec;
use crate::elastic::{FieldResolver, ResolvedField};
use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Calendar units whose bucket keys carry no time-of-day component.
const DATE_ONLY_INTERVALS: [&str; 4] = ["year", "month", "week", "day"];

/// A grouping dimension for an aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Axis {
    /// Group by a document field, optionally bucketed by interval.
    Field {
        field: String,
        interval: Option<String>,
        name: Option<String>,
    },
    /// Group by the label of each supplied named query.
    Query { name: Option<String> },
}

impl Axis {
    pub fn field(field: impl Into<String>) -> Self {
        Axis::Field {
            field: field.into(),
            interval: None,
            name: None,
        }
    }

    pub fn interval(field: impl Into<String>, interval: impl Into<String>) -> Self {
        Axis::Field {
            field: field.into(),
            interval: Some(interval.into()),
            name: None,
        }
    }

    pub fn by_query() -> Self {
        Axis::Query { name: None }
    }

    pub fn named(self, name: impl Into<String>) -> Self {
        match self {
            Axis::Field {
                field, interval, ..
            } => Axis::Field {
                field,
                interval,
                name: Some(name.into()),
            },
            Axis::Query { .. } => Axis::Query {
                name: Some(name.into()),
            },
        }
    }

    /// Column name: explicit name, else `field` or `field_interval`.
    pub fn name(&self) -> String {
        match self {
            Axis::Field {
                name: Some(name), ..
            }
            | Axis::Query {
                name: Some(name), ..
            } => name.clone(),
            Axis::Field {
                field,
                interval: Some(interval),
                ..
            } => format!("{}_{}", field, interval),
            Axis::Field { field, .. } => field.clone(),
            Axis::Query { .. } => "_query".to_string(),
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Axis::Query { .. })
    }
}

#[derive(Debug, Clone)]
enum Binding {
    Query,
    Field {
        ftype: ResolvedField,
        /// Present for recognized custom intervals on date fields.
        codec: Option<IntervalCodec>,
    },
}

/// An axis bound to an index set, with its field type resolved.
#[derive(Debug, Clone)]
pub struct BoundAxis {
    axis: Axis,
    name: String,
    binding: Binding,
}

impl BoundAxis {
    pub async fn bind(axis: Axis, indices: &[String], resolver: &FieldResolver) -> Result<Self> {
        let name = axis.name();
        let binding = match &axis {
            Axis::Query { .. } => Binding::Query,
            Axis::Field {
                field, interval, ..
            } => {
                let ftype = resolver.field_type(indices, field).await?;
                let codec = if ftype.ftype.is_date() {
                    interval.as_deref().and_then(IntervalCodec::resolve)
                } else {
                    None
                };
                Binding::Field { ftype, codec }
            }
        };
        Ok(Self {
            axis,
            name,
            binding,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_query(&self) -> bool {
        matches!(self.binding, Binding::Query)
    }

    fn field_parts(&self) -> (&str, Option<&str>, &ResolvedField, Option<IntervalCodec>) {
        let Axis::Field {
            field, interval, ..
        } = &self.axis
        else {
            unreachable!("query axis reached the composite layer")
        };
        let Binding::Field { ftype, codec } = &self.binding else {
            unreachable!("query axis reached the composite layer")
        };
        (field.as_str(), interval.as_deref(), ftype, *codec)
    }

    /// Composite bucket source for this axis, keyed by the axis name.
    ///
    /// Strategy depends on the resolved type: plain `terms`, numeric
    /// `histogram`, codec runtime-field `terms`, or calendar
    /// `date_histogram`.
    pub fn bucket_source(&self) -> Result<Value> {
        let (field, interval, ftype, codec) = self.field_parts();
        let source = match (interval, codec) {
            (None, _) => json!({ "terms": { "field": field } }),
            (Some(_), Some(codec)) => json!({ "terms": { "field": codec.field_name(field) } }),
            (Some(interval), None) if ftype.ftype.is_date() => {
                json!({ "date_histogram": { "field": field, "calendar_interval": interval } })
            }
            (Some(interval), None) => {
                let width: f64 = interval
                    .parse()
                    .map_err(|_| Error::InvalidInterval(interval.to_string()))?;
                json!({ "histogram": { "field": field, "interval": width } })
            }
        };
        let mut keyed = Map::new();
        keyed.insert(self.name.clone(), source);
        Ok(Value::Object(keyed))
    }

    /// Runtime mapping fragment, when the interval needs a computed field.
    pub fn runtime_mapping(&self) -> Option<Value> {
        match &self.binding {
            Binding::Field {
                codec: Some(codec), ..
            } => {
                let Axis::Field { field, .. } = &self.axis else {
                    unreachable!("codec binding on query axis")
                };
                Some(codec.runtime_mapping(field))
            }
            _ => None,
        }
    }

    /// Bind without a live resolver, for tests that only exercise DSL
    /// generation and decoding.
    #[cfg(test)]
    pub(crate) fn bound_for_tests(
        axis: Axis,
        ftype: crate::elastic::FieldType,
        codec: Option<IntervalCodec>,
    ) -> Self {
        Self {
            name: axis.name(),
            binding: Binding::Field {
                ftype: ResolvedField {
                    ftype,
                    merged: false,
                },
                codec,
            },
            axis,
        }
    }

    /// Decode a raw bucket key into the domain value.
    pub fn decode_key(&self, raw: &Value) -> Value {
        let (_, interval, ftype, codec) = self.field_parts();
        if let Some(codec) = codec {
            return codec.decode(raw);
        }
        if ftype.ftype.is_date() {
            return decode_date(raw, interval);
        }
        raw.clone()
    }
}

/// Interpret an epoch-milliseconds key, truncating calendar-unit intervals
/// to a plain date. Non-numeric keys pass through untouched.
fn decode_date(raw: &Value, interval: Option<&str>) -> Value {
    let Some(millis) = raw.as_i64() else {
        return raw.clone();
    };
    let Some(timestamp) = DateTime::<Utc>::from_timestamp_millis(millis) else {
        return raw.clone();
    };
    if interval.is_some_and(|i| DATE_ONLY_INTERVALS.contains(&i)) {
        Value::String(timestamp.date_naive().to_string())
    } else {
        Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

/// Metric functions the backend computes per bucket over a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFunction {
    Avg,
    Sum,
    Min,
    Max,
    Cardinality,
    ValueCount,
}

impl MetricFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricFunction::Avg => "avg",
            MetricFunction::Sum => "sum",
            MetricFunction::Min => "min",
            MetricFunction::Max => "max",
            MetricFunction::Cardinality => "cardinality",
            MetricFunction::ValueCount => "value_count",
        }
    }
}

/// A metric computed over a field, unbound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub field: String,
    pub function: MetricFunction,
    pub name: Option<String>,
}

impl Aggregation {
    pub fn new(function: MetricFunction, field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            function,
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Column name: explicit name, else `function_field`.
    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.function.as_str(), self.field))
    }
}

/// A metric bound to an index set (type information is needed to decode
/// date-valued results).
#[derive(Debug, Clone)]
pub struct BoundAggregation {
    aggregation: Aggregation,
    name: String,
    ftype: ResolvedField,
}

impl BoundAggregation {
    pub async fn bind(
        aggregation: Aggregation,
        indices: &[String],
        resolver: &FieldResolver,
    ) -> Result<Self> {
        let ftype = resolver.field_type(indices, &aggregation.field).await?;
        let name = aggregation.name();
        Ok(Self {
            aggregation,
            name,
            ftype,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(test)]
    pub(crate) fn bound_for_tests(aggregation: Aggregation, ftype: crate::elastic::FieldType) -> Self {
        Self {
            name: aggregation.name(),
            aggregation,
            ftype: ResolvedField {
                ftype,
                merged: false,
            },
        }
    }

    /// `(name, {function: {field}})` fragment for the metrics block.
    pub fn dsl_item(&self) -> (String, Value) {
        (
            self.name.clone(),
            json!({
                self.aggregation.function.as_str(): { "field": self.aggregation.field }
            }),
        )
    }

    /// Read this metric's scalar out of a bucket (or the top-level
    /// aggregations node on the axis-less path). Null stays null; date
    /// metrics come back as epoch milliseconds and are converted.
    pub fn decode(&self, bucket: &Value) -> Value {
        let value = &bucket[&self.name]["value"];
        if value.is_null() {
            return Value::Null;
        }
        if self.ftype.ftype.is_date() {
            if let Some(millis) = value.as_f64() {
                if let Some(timestamp) = DateTime::<Utc>::from_timestamp_millis(millis as i64) {
                    return Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Secs, true));
                }
            }
        }
        value.clone()
    }
}
