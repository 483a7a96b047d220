//! Query-string and filter clause construction
//!
//! Shared by the aggregation engine and the (out-of-tree) document listing
//! surface: named query strings plus per-field filters become one backend
//! query clause.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// An ordered set of labeled query strings.
///
/// Labels matter: the `_query` grouping axis emits them as bucket values,
/// and result rows keep the insertion order of the labels. A bare list of
/// query strings is accepted and labeled by the strings themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Queries(Vec<(String, String)>);

impl Queries {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub(crate) fn single(label: &str, query: &str) -> Self {
        Self(vec![(label.to_string(), query.to_string())])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(l, q)| (l.as_str(), q.as_str()))
    }
}

impl From<Vec<(String, String)>> for Queries {
    fn from(labeled: Vec<(String, String)>) -> Self {
        Self(labeled)
    }
}

impl From<Vec<String>> for Queries {
    fn from(bare: Vec<String>) -> Self {
        Self(bare.into_iter().map(|q| (q.clone(), q)).collect())
    }
}

impl From<Vec<&str>> for Queries {
    fn from(bare: Vec<&str>) -> Self {
        bare.iter()
            .map(|q| q.to_string())
            .collect::<Vec<_>>()
            .into()
    }
}

/// A per-field constraint: exact value or range with open/closed bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    Value { value: Value },
    Range { range: RangeFilter },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<Value>,
}

/// Filters keyed by field name.
pub type Filters = BTreeMap<String, Filter>;

impl Filter {
    pub fn value(value: impl Into<Value>) -> Self {
        Filter::Value {
            value: value.into(),
        }
    }

    pub fn range(range: RangeFilter) -> Self {
        Filter::Range { range }
    }

    fn clause(&self, field: &str) -> Value {
        match self {
            Filter::Value { value } => json!({ "term": { field: value } }),
            Filter::Range { range } => json!({ "range": { field: range } }),
        }
    }
}

fn query_string_clause(query: &str) -> Value {
    json!({ "query_string": { "query": query } })
}

/// Build the backend query clause for a set of queries and filters.
///
/// Several queries are combined disjunctively; filters go into the `bool`
/// filter context so they never affect scoring. Returns `None` when there is
/// nothing to constrain by.
pub fn build_query_body(queries: &Queries, filters: &Filters) -> Option<Value> {
    let query_clause = match queries.len() {
        0 => None,
        1 => queries.iter().next().map(|(_, q)| query_string_clause(q)),
        _ => Some(json!({
            "bool": {
                "should": queries.iter().map(|(_, q)| query_string_clause(q)).collect::<Vec<_>>(),
                "minimum_should_match": 1
            }
        })),
    };

    if filters.is_empty() {
        return query_clause;
    }

    let filter_clauses: Vec<Value> = filters
        .iter()
        .map(|(field, filter)| filter.clause(field))
        .collect();
    Some(json!({
        "bool": {
            "must": query_clause.unwrap_or_else(|| json!({ "match_all": {} })),
            "filter": filter_clauses
        }
    }))
}
