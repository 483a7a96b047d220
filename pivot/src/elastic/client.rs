//! HTTP client for Elasticsearch-style REST backends

use super::{join_indices, SearchEngine};
use crate::config::ElasticConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// `SearchEngine` implementation over the backend's REST API.
pub struct ElasticClient {
    http: reqwest::Client,
    base: Url,
}

impl ElasticClient {
    pub fn new(base: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    pub fn from_config(config: &ElasticConfig) -> Result<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| Error::Backend(format!("Invalid backend URL '{}': {}", config.url, e)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::Backend(format!("Invalid request path '{}': {}", path, e)))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let url = self.endpoint(path)?;
        let response = self.http.post(url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Backend(format!(
                "POST {} returned {}: {}",
                path, status, text
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl SearchEngine for ElasticClient {
    async fn search(&self, indices: &[String], body: &Value) -> Result<Value> {
        self.post(&format!("{}/_search", join_indices(indices)), body)
            .await
    }

    async fn count(&self, indices: &[String], query: Option<&Value>) -> Result<u64> {
        let body = match query {
            Some(q) => json!({ "query": q }),
            None => json!({}),
        };
        let response = self
            .post(&format!("{}/_count", join_indices(indices)), &body)
            .await?;
        response["count"].as_u64().ok_or_else(|| {
            Error::UnexpectedResponse(format!("_count response without count: {}", response))
        })
    }

    async fn mapping(&self, index: &str) -> Result<Value> {
        let url = self.endpoint(&format!("{}/_mapping", index))?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Backend(format!(
                "GET {}/_mapping returned {}: {}",
                index, status, text
            )));
        }
        let body: Value = response.json().await?;
        // {index: {mappings: {properties: {...}}}}; an empty index has no properties
        let properties = body[index]["mappings"]
            .get("properties")
            .cloned()
            .unwrap_or_else(|| json!({}));
        Ok(properties)
    }
}
