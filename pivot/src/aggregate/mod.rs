//! Multi-axis aggregation over a search backend
//!
//! A request declares grouping axes and metric aggregations; the engine
//! binds them to the target indices, assembles one composite bucket query,
//! drains its cursor pages, and decodes raw bucket keys back into typed
//! values. The reserved query axis is handled here by fanning out one
//! pipeline run per named query and splicing the label back into each row.

mod axis;
mod composite;
mod intervals;
mod paginate;
mod result;

pub use axis::{Aggregation, Axis, BoundAggregation, BoundAxis, MetricFunction};
pub use intervals::IntervalCodec;
pub use result::AggregateResult;

use crate::config::Config;
use crate::elastic::{ElasticClient, FieldResolver, SearchEngine};
use crate::error::{Error, Result};
use crate::query::{build_query_body, Filters, Queries};
use composite::{merged_runtime_mappings, metrics_dsl};
use futures::{pin_mut, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Name of the document count column in result rows.
const COUNT_COLUMN: &str = "n";

/// The aggregation engine: a backend handle, the shared field resolver, and
/// the composite page size.
pub struct Aggregator {
    engine: Arc<dyn SearchEngine>,
    fields: Arc<FieldResolver>,
    page_size: usize,
}

impl Aggregator {
    pub fn new(engine: Arc<dyn SearchEngine>, fields: Arc<FieldResolver>) -> Self {
        Self {
            engine,
            fields,
            page_size: 1000,
        }
    }

    /// Convenience constructor owning its resolver. Share a resolver via
    /// [`Aggregator::new`] when the storage layer also needs to invalidate it.
    pub fn for_engine(engine: Arc<dyn SearchEngine>) -> Self {
        let fields = Arc::new(FieldResolver::new(engine.clone()));
        Self::new(engine, fields)
    }

    /// Build an HTTP-backed aggregator from configuration.
    pub fn connect(config: &Config) -> Result<Self> {
        let client: Arc<dyn SearchEngine> = Arc::new(ElasticClient::from_config(&config.elastic)?);
        Ok(Self::for_engine(client).with_page_size(config.elastic.page_size))
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn fields(&self) -> &Arc<FieldResolver> {
        &self.fields
    }

    /// Run an aggregate query.
    ///
    /// Result rows are ordered axis values, the matching document count,
    /// then metric values. With a query axis present the rows of each named
    /// query are concatenated in label order.
    ///
    /// Note that date histogram axes also yield buckets for intervening
    /// empty intervals, regardless of the axis position in the list.
    pub async fn aggregate(
        &self,
        indices: &[String],
        axes: Vec<Axis>,
        aggregations: Vec<Aggregation>,
        queries: Queries,
        filters: Filters,
    ) -> Result<AggregateResult> {
        if axes.iter().filter(|axis| axis.is_query()).count() > 1 {
            return Err(Error::MultipleQueryAxes);
        }

        let mut bound_axes = Vec::with_capacity(axes.len());
        for axis in axes {
            bound_axes.push(BoundAxis::bind(axis, indices, &self.fields).await?);
        }
        let mut bound_aggregations = Vec::with_capacity(aggregations.len());
        for aggregation in aggregations {
            bound_aggregations
                .push(BoundAggregation::bind(aggregation, indices, &self.fields).await?);
        }

        let rows = self
            .rows(indices, &bound_axes, &queries, &filters, &bound_aggregations)
            .await?;
        Ok(AggregateResult::new(
            bound_axes,
            bound_aggregations,
            rows,
            COUNT_COLUMN,
        ))
    }

    /// Top-level row production: peel off the query axis if present, then
    /// delegate to the single-pipeline path.
    async fn rows(
        &self,
        indices: &[String],
        axes: &[BoundAxis],
        queries: &Queries,
        filters: &Filters,
        aggregations: &[BoundAggregation],
    ) -> Result<Vec<Vec<Value>>> {
        let Some(position) = axes.iter().position(|axis| axis.is_query()) else {
            return self
                .rows_plain(indices, axes, queries, filters, aggregations)
                .await;
        };

        // one independent pipeline run per named query, label spliced back
        // into the axis's original tuple position
        let reduced: Vec<BoundAxis> = axes
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != position)
            .map(|(_, axis)| axis.clone())
            .collect();

        let mut rows = Vec::new();
        for (label, query) in queries.iter() {
            debug!(label, "running aggregation for query label");
            let single = Queries::single(label, query);
            for mut row in self
                .rows_plain(indices, &reduced, &single, filters, aggregations)
                .await?
            {
                row.insert(position, Value::String(label.to_string()));
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Pipeline without a query axis: composite pagination when axes are
    /// present, the scalar count/metric path otherwise.
    async fn rows_plain(
        &self,
        indices: &[String],
        axes: &[BoundAxis],
        queries: &Queries,
        filters: &Filters,
        aggregations: &[BoundAggregation],
    ) -> Result<Vec<Vec<Value>>> {
        if axes.is_empty() {
            return self
                .scalar_rows(indices, queries, filters, aggregations)
                .await;
        }

        let query = build_query_body(queries, filters);
        let runtime_mappings = merged_runtime_mappings(axes);
        let buckets = paginate::paginate(
            self.engine.as_ref(),
            indices,
            axes,
            aggregations,
            query,
            runtime_mappings,
            self.page_size,
        );
        pin_mut!(buckets);

        let mut rows = Vec::new();
        while let Some(bucket) = buckets.next().await {
            let bucket = bucket?;
            let mut row = Vec::with_capacity(axes.len() + 1 + aggregations.len());
            for axis in axes {
                row.push(axis.decode_key(&bucket["key"][axis.name()]));
            }
            row.push(bucket["doc_count"].clone());
            for aggregation in aggregations {
                row.push(aggregation.decode(&bucket));
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// Axis-less aggregation: one count round trip, plus one zero-hit
    /// metrics search when metrics were requested. The two use different
    /// backend primitives, so they cannot be combined.
    async fn scalar_rows(
        &self,
        indices: &[String],
        queries: &Queries,
        filters: &Filters,
        aggregations: &[BoundAggregation],
    ) -> Result<Vec<Vec<Value>>> {
        let query = build_query_body(queries, filters);
        let count = self.engine.count(indices, query.as_ref()).await?;

        let mut row = Vec::with_capacity(1 + aggregations.len());
        row.push(json!(count));
        if !aggregations.is_empty() {
            let mut body = json!({ "size": 0, "aggs": metrics_dsl(aggregations) });
            if let Some(query) = &query {
                body["query"] = query.clone();
            }
            let response = self.engine.search(indices, &body).await?;
            paginate::check_shard_failures(&response)?;
            let metrics = &response["aggregations"];
            for aggregation in aggregations {
                row.push(aggregation.decode(metrics));
            }
        }
        Ok(vec![row])
    }
}
