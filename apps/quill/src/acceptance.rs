//! Acceptance Sink — promotes a reviewed draft to persisted, authoritative
//! content.
//!
//! One update call carries `{<fieldName>: finalText}`. On success the
//! backend returns the updated entity, which replaces the locally cached
//! authoritative copy so later reads see the accepted value without a
//! reload. On failure the slot keeps its content and stays retriable — no
//! automatic retry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::DraftError;
use crate::slot::SlotKey;

#[async_trait]
pub trait AcceptanceSink: Send + Sync {
    /// Persists the accepted text to the entity field named by the key.
    /// Returns the updated entity on success.
    async fn persist(&self, key: &SlotKey, text: &str) -> Result<Value, DraftError>;
}

/// Locally cached authoritative entities, refreshed by acceptance responses.
#[derive(Debug, Clone, Default)]
pub struct EntityCache {
    inner: Arc<Mutex<HashMap<Uuid, Value>>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity_id: Uuid) -> Option<Value> {
        self.inner
            .lock()
            .expect("entity cache lock poisoned")
            .get(&entity_id)
            .cloned()
    }

    pub fn put(&self, entity_id: Uuid, entity: Value) {
        self.inner
            .lock()
            .expect("entity cache lock poisoned")
            .insert(entity_id, entity);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP sink
// ────────────────────────────────────────────────────────────────────────────

pub struct HttpAcceptanceSink {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    request_timeout: std::time::Duration,
}

impl HttpAcceptanceSink {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            client: Client::builder()
                .build()
                .expect("Failed to build HTTP client"),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_timeout: std::time::Duration::from_secs(config.request_timeout_secs),
        }
    }
}

#[async_trait]
impl AcceptanceSink for HttpAcceptanceSink {
    async fn persist(&self, key: &SlotKey, text: &str) -> Result<Value, DraftError> {
        let url = format!("{}/api/entities/{}", self.base_url, key.entity_id);
        let body = json!({ key.field.as_str(): text });

        let mut builder = self
            .client
            .patch(&url)
            .json(&body)
            .timeout(self.request_timeout);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        debug!(key = %key, "persisting accepted draft");

        let response = builder
            .send()
            .await
            .map_err(|e| DraftError::Persist(format!("update failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DraftError::Persist(format!(
                "backend returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| DraftError::Persist(format!("invalid entity in response: {e}")))
    }
}
