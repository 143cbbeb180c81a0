//! Knowledge-base lookups routed by database name.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use genoflow_core::config::KnowledgeConfig;
use genoflow_core::error::{GenoflowError, Result};
use genoflow_core::traits::KnowledgeBase;

/// A single queryable database.
pub trait KnowledgeSource: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn query<'a>(&'a self, query: &'a Value) -> BoxFuture<'a, Result<Value>>;
}

/// Dispatches `knowledge_query` steps to the named source.
pub struct KnowledgeRouter {
    sources: BTreeMap<String, Arc<dyn KnowledgeSource>>,
}

impl KnowledgeRouter {
    pub fn new() -> Self {
        Self {
            sources: BTreeMap::new(),
        }
    }

    /// Names are matched case-insensitively.
    pub fn register(&mut self, source: impl KnowledgeSource) {
        self.sources
            .insert(source.name().to_ascii_lowercase(), Arc::new(source));
    }

    pub fn databases(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }

    pub fn with_builtins(config: &KnowledgeConfig) -> Result<Self> {
        let mut router = Self::new();
        router.register(EnsemblSource::new(config)?);
        Ok(router)
    }
}

impl Default for KnowledgeRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeBase for KnowledgeRouter {
    fn query<'a>(&'a self, database: &'a str, query: &'a Value) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let source = self
                .sources
                .get(&database.to_ascii_lowercase())
                .ok_or_else(|| GenoflowError::KnowledgeQuery {
                    database: database.to_string(),
                    message: format!(
                        "unknown database (available: {})",
                        self.databases().join(", ")
                    ),
                })?;
            debug!(database = %database, "Routing knowledge query");
            source.query(query).await
        })
    }
}

/// Ensembl REST lookups.
pub struct EnsemblSource {
    http: Client,
    base_url: String,
    species: String,
}

impl EnsemblSource {
    pub fn new(config: &KnowledgeConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| query_error(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.ensembl_url.trim_end_matches('/').to_string(),
            species: config.species.clone(),
        })
    }

    /// Resolve a query to a REST path.
    fn path_for(&self, query: &Value) -> Result<String> {
        let field = |key: &str| query.get(key).and_then(Value::as_str);

        if let Some(symbol) = query.as_str().or_else(|| field("symbol")) {
            let species = field("species").unwrap_or(self.species.as_str());
            return Ok(format!("/lookup/symbol/{}/{}", species, symbol.trim()));
        }
        if let Some(region) = field("region") {
            let species = field("species").unwrap_or(self.species.as_str());
            let feature = field("feature").unwrap_or("gene");
            return Ok(format!(
                "/overlap/region/{}/{}?feature={}",
                species,
                region.trim(),
                feature
            ));
        }
        if let Some(id) = field("id") {
            return Ok(format!("/lookup/id/{}", id.trim()));
        }
        Err(query_error(format!(
            "query must be a gene symbol or carry 'symbol', 'region' or 'id': {}",
            query
        )))
    }
}

fn query_error(message: impl Into<String>) -> GenoflowError {
    GenoflowError::KnowledgeQuery {
        database: "ensembl".to_string(),
        message: message.into(),
    }
}

impl KnowledgeSource for EnsemblSource {
    fn name(&self) -> &str {
        "ensembl"
    }

    fn query<'a>(&'a self, query: &'a Value) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let url = format!("{}{}", self.base_url, self.path_for(query)?);
            debug!(url = %url, "Ensembl lookup");

            let response = self
                .http
                .get(&url)
                .header("Content-Type", "application/json")
                .send()
                .await
                .map_err(|e| query_error(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown error".to_string());
                return Err(query_error(format!("HTTP {}: {}", status, body)));
            }

            response
                .json()
                .await
                .map_err(|e| query_error(e.to_string()))
        })
    }
}
