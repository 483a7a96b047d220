//! Aggregation result rows and named-column rendering

use crate::aggregate::axis::{BoundAggregation, BoundAxis};
use serde_json::{Map, Value};

/// The materialized outcome of an aggregation request.
///
/// Rows are fixed-width tuples in declared column order: axis values, then
/// the document count, then metric values. They are computed once; repeated
/// rendering never goes back to the backend.
pub struct AggregateResult {
    axes: Vec<BoundAxis>,
    aggregations: Vec<BoundAggregation>,
    rows: Vec<Vec<Value>>,
    count_column: String,
}

impl AggregateResult {
    pub(crate) fn new(
        axes: Vec<BoundAxis>,
        aggregations: Vec<BoundAggregation>,
        rows: Vec<Vec<Value>>,
        count_column: impl Into<String>,
    ) -> Self {
        let result = Self {
            axes,
            aggregations,
            rows,
            count_column: count_column.into(),
        };
        debug_assert!(result
            .rows
            .iter()
            .all(|row| row.len() == result.width()));
        result
    }

    pub fn axes(&self) -> &[BoundAxis] {
        &self.axes
    }

    pub fn aggregations(&self) -> &[BoundAggregation] {
        &self.aggregations
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn width(&self) -> usize {
        self.axes.len() + 1 + self.aggregations.len()
    }

    /// Column names in row order: axes, count column, metrics.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.axes.iter().map(|a| a.name().to_string()).collect();
        columns.push(self.count_column.clone());
        columns.extend(self.aggregations.iter().map(|a| a.name().to_string()));
        columns
    }

    /// Render each row as a name-keyed mapping, preserving column order.
    pub fn as_dicts(&self) -> impl Iterator<Item = Map<String, Value>> + '_ {
        let columns = self.columns();
        self.rows.iter().map(move |row| {
            columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect::<Map<String, Value>>()
        })
    }
}
