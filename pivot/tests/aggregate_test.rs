//! Integration tests for the aggregation pipeline against a scripted backend
//!
//! The mock engine replays canned responses in order and records every
//! request body, so tests can assert both the produced rows and the wire
//! bodies the engine sent.

use async_trait::async_trait;
use parking_lot::Mutex;
use pivot::aggregate::{Aggregation, Aggregator, Axis, MetricFunction};
use pivot::elastic::{FieldResolver, FieldType, SearchEngine};
use pivot::query::{Filters, Queries};
use pivot::{Error, Result};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct MockEngine {
    searches: Mutex<VecDeque<Value>>,
    counts: Mutex<VecDeque<u64>>,
    mappings: HashMap<String, Value>,
    search_bodies: Mutex<Vec<Value>>,
    mapping_calls: AtomicUsize,
}

impl MockEngine {
    fn new(mappings: HashMap<String, Value>) -> Self {
        Self {
            searches: Mutex::new(VecDeque::new()),
            counts: Mutex::new(VecDeque::new()),
            mappings,
            search_bodies: Mutex::new(Vec::new()),
            mapping_calls: AtomicUsize::new(0),
        }
    }

    /// Mock with a single "articles" index.
    fn articles(properties: Value) -> Self {
        Self::new(HashMap::from([("articles".to_string(), properties)]))
    }

    fn push_search(&self, response: Value) {
        self.searches.lock().push_back(response);
    }

    fn push_count(&self, count: u64) {
        self.counts.lock().push_back(count);
    }

    fn recorded_searches(&self) -> Vec<Value> {
        self.search_bodies.lock().clone()
    }
}

#[async_trait]
impl SearchEngine for MockEngine {
    async fn search(&self, _indices: &[String], body: &Value) -> Result<Value> {
        self.search_bodies.lock().push(body.clone());
        self.searches
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Backend("no scripted search response left".to_string()))
    }

    async fn count(&self, _indices: &[String], _query: Option<&Value>) -> Result<u64> {
        self.counts
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Backend("no scripted count left".to_string()))
    }

    async fn mapping(&self, index: &str) -> Result<Value> {
        self.mapping_calls.fetch_add(1, Ordering::SeqCst);
        self.mappings
            .get(index)
            .cloned()
            .ok_or_else(|| Error::Backend(format!("no mapping for index {}", index)))
    }
}

/// Captures formatted log output so tests can assert on emitted events.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn articles_index() -> Vec<String> {
    vec!["articles".to_string()]
}

fn page(buckets: Value, after_key: Option<Value>) -> Value {
    let mut groups = json!({ "buckets": buckets });
    if let Some(after_key) = after_key {
        groups["after_key"] = after_key;
    }
    json!({
        "_shards": { "total": 1, "successful": 1, "failed": 0 },
        "aggregations": { "groups": groups }
    })
}

#[tokio::test]
async fn test_multi_page_drain_matches_count() {
    let mock = Arc::new(MockEngine::articles(json!({
        "medium": { "type": "keyword" }
    })));
    mock.push_search(page(
        json!([
            { "key": { "medium": "newspaper" }, "doc_count": 2 },
            { "key": { "medium": "tv" }, "doc_count": 1 }
        ]),
        Some(json!({ "medium": "tv" })),
    ));
    mock.push_search(page(
        json!([{ "key": { "medium": "web" }, "doc_count": 2 }]),
        None,
    ));
    mock.push_count(5);

    let aggregator = Aggregator::for_engine(mock.clone());
    let result = aggregator
        .aggregate(
            &articles_index(),
            vec![Axis::field("medium")],
            vec![],
            Queries::none(),
            Filters::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.rows().len(), 3);
    assert!(result.rows().iter().all(|row| row.len() == 2));
    let bucket_total: u64 = result
        .rows()
        .iter()
        .map(|row| row[1].as_u64().unwrap())
        .sum();

    // the same filterless request counted directly
    let scalar = aggregator
        .aggregate(
            &articles_index(),
            vec![],
            vec![],
            Queries::none(),
            Filters::new(),
        )
        .await
        .unwrap();
    assert_eq!(scalar.rows(), &[vec![json!(5)]]);
    assert_eq!(bucket_total, 5);

    // the second page request carried the continuation cursor
    let bodies = mock.recorded_searches();
    assert_eq!(bodies.len(), 2);
    assert!(bodies[0]["aggs"]["groups"]["composite"]
        .get("after")
        .is_none());
    assert_eq!(
        bodies[1]["aggs"]["groups"]["composite"]["after"],
        json!({ "medium": "tv" })
    );
}

#[tokio::test]
async fn test_query_axis_label_position() {
    let mock = Arc::new(MockEngine::articles(json!({
        "medium": { "type": "keyword" },
        "channel": { "type": "keyword" }
    })));
    // fixture: axis medium has two values under q1, one row under q2
    mock.push_search(page(
        json!([
            { "key": { "medium": "a1", "channel": "b1" }, "doc_count": 1 },
            { "key": { "medium": "a2", "channel": "b2" }, "doc_count": 2 }
        ]),
        None,
    ));
    mock.push_search(page(
        json!([{ "key": { "medium": "a1", "channel": "b1" }, "doc_count": 3 }]),
        None,
    ));

    let aggregator = Aggregator::for_engine(mock.clone());
    let result = aggregator
        .aggregate(
            &articles_index(),
            vec![Axis::field("medium"), Axis::by_query(), Axis::field("channel")],
            vec![],
            vec![
                ("q1".to_string(), "foo".to_string()),
                ("q2".to_string(), "bar".to_string()),
            ]
            .into(),
            Filters::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        result.rows(),
        &[
            vec![json!("a1"), json!("q1"), json!("b1"), json!(1)],
            vec![json!("a2"), json!("q1"), json!("b2"), json!(2)],
            vec![json!("a1"), json!("q2"), json!("b1"), json!(3)],
        ]
    );
    assert_eq!(result.columns(), vec!["medium", "_query", "channel", "n"]);

    // each fan-out run carried exactly its own query string
    let bodies = mock.recorded_searches();
    assert_eq!(bodies.len(), 2);
    assert_eq!(
        bodies[0]["query"],
        json!({ "query_string": { "query": "foo" } })
    );
    assert_eq!(
        bodies[1]["query"],
        json!({ "query_string": { "query": "bar" } })
    );
}

#[tokio::test]
async fn test_scalar_count_and_average() {
    // four documents with lengths 1, 2, 3, 4
    let mock = Arc::new(MockEngine::articles(json!({
        "length": { "type": "long" }
    })));
    mock.push_count(4);
    mock.push_search(json!({
        "_shards": { "total": 1, "successful": 1, "failed": 0 },
        "aggregations": { "avg_length": { "value": 2.5 } }
    }));

    let aggregator = Aggregator::for_engine(mock);
    let result = aggregator
        .aggregate(
            &articles_index(),
            vec![],
            vec![Aggregation::new(MetricFunction::Avg, "length")],
            Queries::none(),
            Filters::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.rows(), &[vec![json!(4), json!(2.5)]]);
    assert_eq!(result.columns(), vec!["n", "avg_length"]);
}

#[tokio::test]
async fn test_date_axis_truncation() {
    let mock = Arc::new(MockEngine::articles(json!({
        "date": { "type": "date" }
    })));
    // 2021-03-01T13:00:00Z in epoch milliseconds
    let millis: i64 = 1_614_603_600_000;
    mock.push_search(page(
        json!([{ "key": { "date_day": millis }, "doc_count": 2 }]),
        None,
    ));
    mock.push_search(page(
        json!([{ "key": { "date_hour": millis }, "doc_count": 2 }]),
        None,
    ));

    let aggregator = Aggregator::for_engine(mock);
    let by_day = aggregator
        .aggregate(
            &articles_index(),
            vec![Axis::interval("date", "day")],
            vec![],
            Queries::none(),
            Filters::new(),
        )
        .await
        .unwrap();
    assert_eq!(by_day.rows()[0][0], json!("2021-03-01"));

    let by_hour = aggregator
        .aggregate(
            &articles_index(),
            vec![Axis::interval("date", "hour")],
            vec![],
            Queries::none(),
            Filters::new(),
        )
        .await
        .unwrap();
    assert_eq!(by_hour.rows()[0][0], json!("2021-03-01T13:00:00Z"));
}

#[tokio::test]
async fn test_codec_axis_round_trip() {
    let mock = Arc::new(MockEngine::articles(json!({
        "date": { "type": "date" }
    })));
    mock.push_search(page(
        json!([{ "key": { "date_dayofweek": "Monday" }, "doc_count": 7 }]),
        None,
    ));

    let aggregator = Aggregator::for_engine(mock.clone());
    let result = aggregator
        .aggregate(
            &articles_index(),
            vec![Axis::interval("date", "dayofweek")],
            vec![],
            Queries::none(),
            Filters::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.rows(), &[vec![json!("Monday"), json!(7)]]);

    // the request bucketed on the runtime field and defined it
    let body = &mock.recorded_searches()[0];
    assert_eq!(
        body["aggs"]["groups"]["composite"]["sources"][0],
        json!({ "date_dayofweek": { "terms": { "field": "date_dayofweek" } } })
    );
    assert!(body["runtime_mappings"]["date_dayofweek"]["script"]["source"]
        .as_str()
        .unwrap()
        .contains("dayOfWeekEnum"));
}

#[tokio::test]
async fn test_shard_failure_aborts_without_rows() {
    let mock = Arc::new(MockEngine::articles(json!({
        "medium": { "type": "keyword" }
    })));
    mock.push_search(json!({
        "_shards": {
            "total": 2,
            "successful": 1,
            "failed": 1,
            "failures": [{ "shard": 1, "reason": { "type": "io_exception" } }]
        },
        "aggregations": { "groups": { "buckets": [
            { "key": { "medium": "newspaper" }, "doc_count": 2 }
        ] } }
    }));

    let aggregator = Aggregator::for_engine(mock);
    let result = aggregator
        .aggregate(
            &articles_index(),
            vec![Axis::field("medium")],
            vec![],
            Queries::none(),
            Filters::new(),
        )
        .await;
    assert!(matches!(result, Err(Error::ShardFailure { .. })));
}

#[tokio::test]
async fn test_second_query_axis_is_rejected_before_any_call() {
    let mock = Arc::new(MockEngine::articles(json!({
        "medium": { "type": "keyword" }
    })));

    let aggregator = Aggregator::for_engine(mock.clone());
    let result = aggregator
        .aggregate(
            &articles_index(),
            vec![Axis::by_query(), Axis::field("medium"), Axis::by_query()],
            vec![],
            vec!["foo"].into(),
            Filters::new(),
        )
        .await;

    assert!(matches!(result, Err(Error::MultipleQueryAxes)));
    assert!(mock.recorded_searches().is_empty());
    assert_eq!(mock.mapping_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_field_names_field_and_index() {
    let mock = Arc::new(MockEngine::articles(json!({
        "medium": { "type": "keyword" }
    })));

    let aggregator = Aggregator::for_engine(mock);
    let result = aggregator
        .aggregate(
            &articles_index(),
            vec![Axis::field("missing")],
            vec![],
            Queries::none(),
            Filters::new(),
        )
        .await;

    match result {
        Err(Error::FieldResolution { field, index }) => {
            assert_eq!(field, "missing");
            assert_eq!(index, "articles");
        }
        other => panic!("expected FieldResolution, got {:?}", other.map(|_| "rows")),
    }
}

#[tokio::test]
async fn test_conflicting_types_merge_to_keyword() {
    let mock = Arc::new(MockEngine::new(HashMap::from([
        (
            "articles".to_string(),
            json!({ "medium": { "type": "keyword" } }),
        ),
        (
            "archive".to_string(),
            json!({ "medium": { "type": "long" } }),
        ),
    ])));

    let resolver = FieldResolver::new(mock);
    let indices = vec!["articles".to_string(), "archive".to_string()];
    let resolved = resolver.field_type(&indices, "medium").await.unwrap();
    assert_eq!(resolved.ftype, FieldType::Keyword);
    assert!(resolved.merged);

    // single-index resolution is unaffected
    let single = resolver
        .field_type(&articles_index(), "medium")
        .await
        .unwrap();
    assert_eq!(single.ftype, FieldType::Keyword);
    assert!(!single.merged);
}

#[tokio::test]
async fn test_field_values_lists_distinct_terms() {
    let mock = Arc::new(MockEngine::articles(json!({
        "medium": { "type": "keyword" }
    })));
    mock.push_search(json!({
        "aggregations": { "values": { "buckets": [
            { "key": "newspaper", "doc_count": 3 },
            { "key": "tv", "doc_count": 1 }
        ] } }
    }));

    let resolver = FieldResolver::new(mock.clone());
    let values = resolver
        .field_values(&articles_index(), "medium")
        .await
        .unwrap();
    assert_eq!(values, vec![json!("newspaper"), json!("tv")]);

    // a hit-less terms aggregation on the requested field
    let body = &mock.recorded_searches()[0];
    assert_eq!(body["size"], json!(0));
    assert_eq!(body["aggs"]["values"]["terms"]["field"], json!("medium"));
}

#[tokio::test]
async fn test_pagination_logs_each_drained_page() {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let mock = Arc::new(MockEngine::articles(json!({
        "medium": { "type": "keyword" }
    })));
    mock.push_search(page(
        json!([{ "key": { "medium": "newspaper" }, "doc_count": 2 }]),
        Some(json!({ "medium": "newspaper" })),
    ));
    mock.push_search(page(
        json!([{ "key": { "medium": "tv" }, "doc_count": 1 }]),
        None,
    ));

    let aggregator = Aggregator::for_engine(mock);
    aggregator
        .aggregate(
            &articles_index(),
            vec![Axis::field("medium")],
            vec![],
            Queries::none(),
            Filters::new(),
        )
        .await
        .unwrap();

    let output = logs.contents();
    assert_eq!(output.matches("drained composite page").count(), 2);
}

#[tokio::test]
async fn test_mapping_cache_and_invalidation() {
    let mock = Arc::new(MockEngine::articles(json!({
        "medium": { "type": "keyword" }
    })));

    let resolver = FieldResolver::new(mock.clone());
    let indices = articles_index();
    resolver.field_type(&indices, "medium").await.unwrap();
    resolver.field_type(&indices, "medium").await.unwrap();
    assert_eq!(mock.mapping_calls.load(Ordering::SeqCst), 1);

    resolver.invalidate("articles");
    resolver.field_type(&indices, "medium").await.unwrap();
    assert_eq!(mock.mapping_calls.load(Ordering::SeqCst), 2);
}
