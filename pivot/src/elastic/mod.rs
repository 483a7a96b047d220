//! Search backend access: capability trait, HTTP client, field resolution

mod client;
mod fields;

pub use client::ElasticClient;
pub use fields::{FieldResolver, FieldType, ResolvedField};

use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Capability interface onto the search backend.
///
/// The aggregation engine only ever needs these three round trips; anything
/// that speaks them (a live cluster, a scripted test double) can drive it.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Execute a search request against one or more indices.
    ///
    /// Aggregation callers send zero-hit bodies (`"size": 0`); the response
    /// must retain the `_shards` section so partial failures stay visible.
    async fn search(&self, indices: &[String], body: &Value) -> Result<Value>;

    /// Exact count of documents matching `query` (all documents when `None`).
    async fn count(&self, indices: &[String], query: Option<&Value>) -> Result<u64>;

    /// Mapping properties of a single index: `{field: {"type": ..., "meta": ...}}`.
    async fn mapping(&self, index: &str) -> Result<Value>;
}

/// Multi-index request paths use the comma-joined form.
pub(crate) fn join_indices(indices: &[String]) -> String {
    indices.join(",")
}
