//! Document loading keyed by query id
//!
//! The listing endpoint must return an array. Anything else is a
//! [`LoadError::DataFormat`], recorded in state like any other failure.

use crate::error::LoadError;
use crate::guard::AsyncLoadGuard;
use crate::loader::{LoadOutcome, LoadState, ResourceLoader};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use wizsync_model::{Document, QueryId};

/// Document listing RPC
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Raw listing for `query`
    async fn fetch_documents(&self, query: &QueryId) -> Result<Value, LoadError>;
}

/// reqwest-backed [`DocumentSource`] (`GET {base}/queries/{id}/documents`)
#[derive(Debug, Clone)]
pub struct HttpDocumentSource {
    client: Client,
    base_url: String,
}

impl HttpDocumentSource {
    /// Source against `base_url`
    ///
    /// # Errors
    /// [`LoadError::Source`] if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LoadError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoadError::source_failed(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch_documents(&self, query: &QueryId) -> Result<Value, LoadError> {
        let url = format!("{}/queries/{}/documents", self.base_url, query);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| LoadError::source_failed(e.to_string()))?;
        response
            .json::<Value>()
            .await
            .map_err(|e| LoadError::source_failed(e.to_string()))
    }
}

fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode a listing, requiring an array of documents
///
/// # Errors
/// [`LoadError::DataFormat`] for a non-array payload or a malformed entry
pub fn parse_documents(value: Value) -> Result<Vec<Document>, LoadError> {
    let Value::Array(items) = value else {
        return Err(LoadError::DataFormat {
            resource: "documents",
            expected: "array",
            actual: shape_of(&value).to_string(),
        });
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value(item).map_err(|e| LoadError::DataFormat {
                resource: "documents",
                expected: "document",
                actual: format!("entry {i}: {e}"),
            })
        })
        .collect()
}

/// Documents of the active query
#[derive(Clone)]
pub struct DocumentLoader {
    source: Arc<dyn DocumentSource>,
    loader: ResourceLoader<QueryId, Vec<Document>>,
}

impl std::fmt::Debug for DocumentLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentLoader")
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

impl DocumentLoader {
    /// Loader over `source` with its own guard
    #[must_use]
    pub fn new(source: Arc<dyn DocumentSource>, guard: Arc<AsyncLoadGuard<QueryId>>) -> Self {
        Self {
            source,
            loader: ResourceLoader::new(guard),
        }
    }

    /// Load documents for `query` (step entry)
    pub async fn load(&self, query: &QueryId) -> LoadOutcome<QueryId, Vec<Document>> {
        let outcome = self.loader.load(query.clone(), self.fetcher()).await;
        self.log(query, &outcome);
        outcome
    }

    /// Load documents for `query` even if loaded recently (user reload)
    pub async fn reload(&self, query: &QueryId) -> LoadOutcome<QueryId, Vec<Document>> {
        let outcome = self.loader.reload(query.clone(), self.fetcher()).await;
        self.log(query, &outcome);
        outcome
    }

    /// Reload `query` in the background, unless another query is wanted
    ///
    /// Used on scan completion. [`LoadOutcome::Stale`] without a fetch
    /// when the user has moved to another query.
    pub async fn refresh(&self, query: &QueryId) -> LoadOutcome<QueryId, Vec<Document>> {
        let outcome = self.loader.refresh(query.clone(), self.fetcher()).await;
        self.log(query, &outcome);
        outcome
    }

    /// Query the loader currently wants documents for
    #[must_use]
    pub fn active_query(&self) -> Option<QueryId> {
        self.loader.guard().active_key()
    }

    /// Documents currently applied
    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        self.loader.read(|s| s.data.clone())
    }

    /// Full load state
    #[must_use]
    pub fn state(&self) -> LoadState<QueryId, Vec<Document>> {
        self.loader.read(Clone::clone)
    }

    /// Change the applied documents (e.g. a review decision)
    pub fn update(&self, f: impl FnOnce(&mut Vec<Document>)) {
        self.loader.update(|s| f(&mut s.data));
    }

    /// Drop documents and ignore outstanding responses
    pub fn clear(&self) {
        self.loader.clear();
    }

    fn fetcher(
        &self,
    ) -> impl Fn(QueryId) -> BoxFuture<'static, Result<Vec<Document>, LoadError>>
           + Send
           + Sync
           + 'static {
        let source = Arc::clone(&self.source);
        move |query: QueryId| {
            let source = Arc::clone(&source);
            async move { parse_documents(source.fetch_documents(&query).await?) }.boxed()
        }
    }

    fn log(&self, query: &QueryId, outcome: &LoadOutcome<QueryId, Vec<Document>>) {
        match outcome {
            LoadOutcome::Applied => {
                let count = self.loader.read(|s| s.data.len());
                tracing::info!(query = %query, count, "documents loaded");
            }
            LoadOutcome::Stale => tracing::debug!(query = %query, "stale document response dropped"),
            LoadOutcome::Failed { error, .. } => {
                tracing::warn!(query = %query, error = %error, "document load failed");
            }
            LoadOutcome::Duplicate | LoadOutcome::Suppressed => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_payload_is_a_format_error() {
        let err = parse_documents(json!({"documents": []})).unwrap_err();
        assert!(matches!(
            err,
            LoadError::DataFormat {
                expected: "array",
                ref actual,
                ..
            } if actual == "object"
        ));
    }

    #[test]
    fn array_payload_decodes() {
        let docs = parse_documents(json!([
            {"_id": "d1", "url": "https://a.nl/1.pdf", "titel": "Nota 1"},
            {"id": "d2", "url": "https://a.nl/2.pdf", "title": "Nota 2"}
        ]))
        .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].title, "Nota 1");
    }

    #[test]
    fn malformed_entry_names_its_index() {
        let err = parse_documents(json!([{"url": 5}])).unwrap_err();
        assert!(err.to_string().contains("entry 0"));
    }
}
