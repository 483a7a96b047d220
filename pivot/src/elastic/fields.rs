//! Field type resolution with per-index caching
//!
//! Mappings are fetched once per index and kept until the storage layer
//! invalidates them (document uploads, mapping changes). Resolving a field
//! across several indices merges the per-index types; disagreeing indices
//! degrade the field to `keyword` with the merged marker set.

use super::{join_indices, SearchEngine};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Semantic field types known to the engine.
///
/// The wire mapping stores the backend type plus an optional `meta.pivot_type`
/// overlay for application types (`url`, `tag`, `id`) that share a backend
/// representation with `keyword`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Long,
    Double,
    Date,
    Keyword,
    Text,
    Url,
    Tag,
    Id,
    Boolean,
    Object,
    GeoPoint,
}

impl FieldType {
    pub fn parse(name: &str) -> Option<FieldType> {
        match name {
            "long" | "integer" | "short" | "byte" | "unsigned_long" => Some(FieldType::Long),
            "double" | "float" | "half_float" => Some(FieldType::Double),
            "date" => Some(FieldType::Date),
            "keyword" | "constant_keyword" | "wildcard" => Some(FieldType::Keyword),
            "text" => Some(FieldType::Text),
            "url" => Some(FieldType::Url),
            "tag" => Some(FieldType::Tag),
            "id" => Some(FieldType::Id),
            "boolean" => Some(FieldType::Boolean),
            "object" => Some(FieldType::Object),
            "geo_point" => Some(FieldType::GeoPoint),
            _ => None,
        }
    }

    /// Read a field type from a single mapping property.
    pub fn from_property(property: &Value) -> Option<FieldType> {
        if let Some(meta) = property["meta"]["pivot_type"].as_str() {
            if let Some(ftype) = FieldType::parse(meta) {
                return Some(ftype);
            }
        }
        property["type"].as_str().and_then(FieldType::parse)
    }

    pub fn is_date(&self) -> bool {
        matches!(self, FieldType::Date)
    }
}

/// A field type resolved against a concrete index set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedField {
    pub ftype: FieldType,
    /// Set when the indices disagreed and the type fell back to `keyword`.
    pub merged: bool,
}

impl ResolvedField {
    fn plain(ftype: FieldType) -> Self {
        Self {
            ftype,
            merged: false,
        }
    }
}

/// Cached per-index field type lookup.
///
/// The cache is owned here so the storage layer can share one resolver per
/// cluster and call [`FieldResolver::invalidate`] on every schema mutation.
pub struct FieldResolver {
    engine: Arc<dyn SearchEngine>,
    cache: RwLock<HashMap<String, HashMap<String, FieldType>>>,
}

impl FieldResolver {
    pub fn new(engine: Arc<dyn SearchEngine>) -> Self {
        Self {
            engine,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Drop the cached mapping for an index. Call after uploading documents
    /// or changing field mappings.
    pub fn invalidate(&self, index: &str) {
        if self.cache.write().remove(index).is_some() {
            debug!(index, "invalidated field cache");
        }
    }

    async fn index_fields(&self, index: &str) -> Result<HashMap<String, FieldType>> {
        if let Some(fields) = self.cache.read().get(index) {
            return Ok(fields.clone());
        }
        debug!(index, "field cache miss, fetching mapping");
        let properties = self.engine.mapping(index).await?;
        let mut fields = HashMap::new();
        if let Some(object) = properties.as_object() {
            for (name, property) in object {
                if let Some(ftype) = FieldType::from_property(property) {
                    fields.insert(name.clone(), ftype);
                }
            }
        }
        self.cache.write().insert(index.to_string(), fields.clone());
        Ok(fields)
    }

    /// All fields across the given indices, with conflict-merged types.
    pub async fn fields(&self, indices: &[String]) -> Result<HashMap<String, ResolvedField>> {
        let mut result: HashMap<String, ResolvedField> = HashMap::new();
        for index in indices {
            for (name, ftype) in self.index_fields(index).await? {
                match result.get_mut(&name) {
                    None => {
                        result.insert(name, ResolvedField::plain(ftype));
                    }
                    Some(existing) if existing.ftype != ftype => {
                        *existing = ResolvedField {
                            ftype: FieldType::Keyword,
                            merged: true,
                        };
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(result)
    }

    /// Resolve a single field against an index set.
    pub async fn field_type(&self, indices: &[String], field: &str) -> Result<ResolvedField> {
        self.fields(indices)
            .await?
            .get(field)
            .copied()
            .ok_or_else(|| Error::FieldResolution {
                field: field.to_string(),
                index: join_indices(indices),
            })
    }

    /// List the distinct values of a field, e.g. to populate filter pickers
    /// for keyword fields.
    pub async fn field_values(&self, indices: &[String], field: &str) -> Result<Vec<Value>> {
        let body = json!({
            "size": 0,
            "aggs": { "values": { "terms": { "field": field } } }
        });
        let response = self.engine.search(indices, &body).await?;
        let buckets = response["aggregations"]["values"]["buckets"]
            .as_array()
            .ok_or_else(|| {
                Error::UnexpectedResponse("terms response without buckets".to_string())
            })?;
        Ok(buckets.iter().map(|b| b["key"].clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_types() {
        assert_eq!(FieldType::parse("date"), Some(FieldType::Date));
        assert_eq!(FieldType::parse("integer"), Some(FieldType::Long));
        assert_eq!(FieldType::parse("half_float"), Some(FieldType::Double));
        assert_eq!(FieldType::parse("wildcard"), Some(FieldType::Keyword));
        assert_eq!(FieldType::parse("dense_vector"), None);
    }

    #[test]
    fn test_meta_type_overrides_backend_type() {
        let property = json!({"type": "keyword", "meta": {"pivot_type": "url"}});
        assert_eq!(FieldType::from_property(&property), Some(FieldType::Url));

        let plain = json!({"type": "keyword"});
        assert_eq!(FieldType::from_property(&plain), Some(FieldType::Keyword));
    }

    #[test]
    fn test_unknown_meta_falls_back() {
        let property = json!({"type": "long", "meta": {"pivot_type": "mystery"}});
        assert_eq!(FieldType::from_property(&property), Some(FieldType::Long));
    }
}
