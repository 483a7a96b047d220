//! Cursor-driven draining of composite bucket pages
//!
//! Each page request depends on the `after_key` of the previous response,
//! so pages are fetched strictly in sequence. The stream is finite and
//! non-restartable; callers drain it fully.

use crate::aggregate::axis::{BoundAggregation, BoundAxis};
use crate::aggregate::composite::{composite_body, COMPOSITE_NAME};
use crate::elastic::SearchEngine;
use crate::error::{Error, Result};
use async_stream::try_stream;
use futures::Stream;
use serde_json::{json, Value};
use tracing::debug;

/// Abort on partial shard failures: an undercounted aggregate is worse than
/// a visible error.
pub(crate) fn check_shard_failures(response: &Value) -> Result<()> {
    let shards = &response["_shards"];
    if let Some(failures) = shards["failures"].as_array() {
        if !failures.is_empty() {
            return Err(Error::ShardFailure {
                failed: shards["failed"].as_u64().unwrap_or(failures.len() as u64),
                total: shards["total"].as_u64().unwrap_or(0),
                reason: Value::Array(failures.clone()).to_string(),
            });
        }
    }
    Ok(())
}

/// Lazily yield every bucket of a composite aggregation, following the
/// continuation cursor until the backend reports none.
///
/// Buckets arrive in backend order: `{key: {axis: raw}, doc_count, metrics...}`.
pub(crate) fn paginate<'a>(
    engine: &'a dyn SearchEngine,
    indices: &'a [String],
    axes: &'a [BoundAxis],
    aggregations: &'a [BoundAggregation],
    query: Option<Value>,
    runtime_mappings: Option<Value>,
    page_size: usize,
) -> impl Stream<Item = Result<Value>> + 'a {
    try_stream! {
        let mut after: Option<Value> = None;
        let mut page = 0usize;
        loop {
            let aggs = composite_body(axes, aggregations, after.as_ref(), page_size)?;
            let mut body = json!({ "size": 0, "aggs": aggs });
            if let Some(query) = &query {
                body["query"] = query.clone();
            }
            if let Some(runtime_mappings) = &runtime_mappings {
                body["runtime_mappings"] = runtime_mappings.clone();
            }

            let response = engine.search(indices, &body).await?;
            check_shard_failures(&response)?;

            let node = &response["aggregations"][COMPOSITE_NAME];
            let buckets = node["buckets"].as_array().ok_or_else(|| {
                Error::UnexpectedResponse("composite response without buckets".to_string())
            })?;
            debug!(page, buckets = buckets.len(), "drained composite page");
            for bucket in buckets {
                yield bucket.clone();
            }

            match node.get("after_key") {
                Some(cursor) if !cursor.is_null() => {
                    after = Some(cursor.clone());
                    page += 1;
                }
                _ => break,
            }
        }
    }
}
