//! # Benthos Admin API
//!
//! Adapter for the stream-processing engine's admin REST surface:
//! `GET/POST/PUT/DELETE /streams/{id}`. Creation returns 400 when the stream
//! already exists; callers treat that as idempotent success.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;

use super::ExternalError;

/// Remote stream state as reported by `GET /streams/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct StreamDetail {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub uptime: f64,
    #[serde(default)]
    pub uptime_str: String,
    pub config: serde_json::Value,
}

#[async_trait]
pub trait BenthosApi: Send + Sync {
    async fn get_stream(&self, id: &str) -> Result<StreamDetail, ExternalError>;
    /// Create the stream; 400 from the server means it already exists and
    /// surfaces as [`ExternalError::AlreadyExists`]
    async fn create_stream(&self, id: &str, config: &serde_json::Value)
        -> Result<(), ExternalError>;
    async fn update_stream(&self, id: &str, config: &serde_json::Value)
        -> Result<(), ExternalError>;
    async fn delete_stream(&self, id: &str) -> Result<(), ExternalError>;
}

/// In-cluster URL of a Benthos server's admin API.
pub fn benthos_url(namespace: &str, reference: &str, port: u16) -> String {
    format!(
        "http://{reference}.{namespace}.{}:{port}",
        crate::constants::CLUSTER_DOMAIN
    )
}

/// Production adapter over the Benthos admin REST API.
#[derive(Debug, Clone)]
pub struct HttpBenthos {
    base_url: String,
    http: reqwest::Client,
}

impl HttpBenthos {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn stream_url(&self, id: &str) -> String {
        format!("{}/streams/{id}", self.base_url)
    }
}

#[async_trait]
impl BenthosApi for HttpBenthos {
    async fn get_stream(&self, id: &str) -> Result<StreamDetail, ExternalError> {
        let response = self.http.get(self.stream_url(id)).send().await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(ExternalError::from_response(response).await)
        }
    }

    async fn create_stream(
        &self,
        id: &str,
        config: &serde_json::Value,
    ) -> Result<(), ExternalError> {
        let response = self
            .http
            .post(self.stream_url(id))
            .json(config)
            .send()
            .await?;
        match response.status().as_u16() {
            s if (200..300).contains(&s) => Ok(()),
            400 => Err(ExternalError::AlreadyExists),
            _ => Err(ExternalError::from_response(response).await),
        }
    }

    async fn update_stream(
        &self,
        id: &str,
        config: &serde_json::Value,
    ) -> Result<(), ExternalError> {
        let response = self
            .http
            .put(self.stream_url(id))
            .json(config)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ExternalError::from_response(response).await)
        }
    }

    async fn delete_stream(&self, id: &str) -> Result<(), ExternalError> {
        let response = self.http.delete(self.stream_url(id)).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ExternalError::from_response(response).await)
        }
    }
}

/// In-memory Benthos server used by the test suite.
#[derive(Debug, Default)]
pub struct InMemoryBenthos {
    streams: Mutex<HashMap<String, serde_json::Value>>,
}

impl InMemoryBenthos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream_config(&self, id: &str) -> Option<serde_json::Value> {
        self.lock().get(id).cloned()
    }

    pub fn stream_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, serde_json::Value>> {
        self.streams
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BenthosApi for InMemoryBenthos {
    async fn get_stream(&self, id: &str) -> Result<StreamDetail, ExternalError> {
        let config = self.lock().get(id).cloned().ok_or(ExternalError::NotFound)?;
        Ok(StreamDetail {
            active: true,
            uptime: 1.0,
            uptime_str: "1s".to_string(),
            config,
        })
    }

    async fn create_stream(
        &self,
        id: &str,
        config: &serde_json::Value,
    ) -> Result<(), ExternalError> {
        let mut streams = self.lock();
        if streams.contains_key(id) {
            // The real server answers 400 on duplicate creation.
            return Err(ExternalError::AlreadyExists);
        }
        streams.insert(id.to_string(), config.clone());
        Ok(())
    }

    async fn update_stream(
        &self,
        id: &str,
        config: &serde_json::Value,
    ) -> Result<(), ExternalError> {
        let mut streams = self.lock();
        if !streams.contains_key(id) {
            return Err(ExternalError::NotFound);
        }
        streams.insert(id.to_string(), config.clone());
        Ok(())
    }

    async fn delete_stream(&self, id: &str) -> Result<(), ExternalError> {
        self.lock()
            .remove(id)
            .map(|_| ())
            .ok_or(ExternalError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_create_reports_already_exists() {
        let server = InMemoryBenthos::new();
        let config = serde_json::json!({"a": 1});
        server.create_stream("s", &config).await.unwrap();
        assert!(matches!(
            server.create_stream("s", &config).await,
            Err(ExternalError::AlreadyExists)
        ));
    }

    #[test]
    fn benthos_url_shape() {
        assert_eq!(
            benthos_url("acme", "search-benthos", 4195),
            "http://search-benthos.acme.svc.cluster.local:4195"
        );
    }
}
