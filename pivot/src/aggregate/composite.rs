//! Composite aggregation request assembly
//!
//! One request body groups by every bound axis at once; source order is the
//! grouping key order and therefore the tuple order of the result rows.

use crate::aggregate::axis::{BoundAggregation, BoundAxis};
use crate::error::Result;
use serde_json::{json, Map, Value};

/// Name of the composite node in request and response bodies.
pub(crate) const COMPOSITE_NAME: &str = "groups";

/// Metrics block: `{name: {function: {field}}}` per bound aggregation.
pub(crate) fn metrics_dsl(aggregations: &[BoundAggregation]) -> Value {
    Value::Object(aggregations.iter().map(|a| a.dsl_item()).collect())
}

/// The `aggs` body for one composite page request.
pub(crate) fn composite_body(
    axes: &[BoundAxis],
    aggregations: &[BoundAggregation],
    after: Option<&Value>,
    page_size: usize,
) -> Result<Value> {
    let sources = axes
        .iter()
        .map(|axis| axis.bucket_source())
        .collect::<Result<Vec<_>>>()?;

    let mut composite = Map::new();
    composite.insert("sources".to_string(), Value::Array(sources));
    composite.insert("size".to_string(), json!(page_size));
    if let Some(after) = after {
        composite.insert("after".to_string(), after.clone());
    }

    let mut node = Map::new();
    node.insert("composite".to_string(), Value::Object(composite));
    if !aggregations.is_empty() {
        node.insert("aggs".to_string(), metrics_dsl(aggregations));
    }

    let mut body = Map::new();
    body.insert(COMPOSITE_NAME.to_string(), Value::Object(node));
    Ok(Value::Object(body))
}

/// Merge every axis's runtime-field fragment into one map.
///
/// Fragments are idempotent per computed field, so later axes overriding an
/// identical key is harmless.
pub(crate) fn merged_runtime_mappings(axes: &[BoundAxis]) -> Option<Value> {
    let mut merged = Map::new();
    for axis in axes {
        if let Some(Value::Object(fragment)) = axis.runtime_mapping() {
            merged.extend(fragment);
        }
    }
    if merged.is_empty() {
        None
    } else {
        Some(Value::Object(merged))
    }
}
