//! Permission service client.
//!
//! # Responsibilities
//! - Define the [`PermissionBackend`] seam the coordinator calls through
//! - Speak the JSON-over-HTTP check protocol with bearer authentication
//! - Classify transport and status failures into [`AuthError`]
//! - Track per-client call statistics
//!
//! Retries, deadlines around retries and circuit breaking live in
//! `resilience`; this client makes exactly one request per call.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::authz::types::PermissionCheck;
use crate::backend::types::{AuthError, BackendCounters, BackendStats, CheckRequest, CheckResponse};
use crate::config::BackendConfig;
use crate::observability::metrics;

/// A remote service that answers permission checks.
#[async_trait]
pub trait PermissionBackend: Send + Sync {
    /// One RPC. Must honour cancellation by being dropped.
    async fn check(&self, check: &PermissionCheck) -> Result<bool, AuthError>;

    /// Cheap liveness probe. Defaults to checking the health probe resource.
    async fn health_check(&self) -> Result<(), AuthError> {
        self.check(&PermissionCheck::health_probe()).await.map(|_| ())
    }
}

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("invalid backend endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// HTTP implementation of [`PermissionBackend`].
#[derive(Clone)]
pub struct HttpPermissionClient {
    http: reqwest::Client,
    check_url: Url,
    health_url: Url,
    token: Option<String>,
    counters: Arc<BackendCounters>,
}

impl HttpPermissionClient {
    pub fn new(config: &BackendConfig) -> Result<Self, ClientBuildError> {
        let mut base = Url::parse(&config.endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;

        let client = Self {
            http,
            check_url: base.join("v1/permissions/check")?,
            health_url: base.join("healthz")?,
            token: config.token.clone().filter(|t| !t.is_empty()),
            counters: Arc::new(BackendCounters::default()),
        };

        tracing::info!(
            endpoint = %client.check_url,
            authenticated = client.token.is_some(),
            "Permission client initialized"
        );
        Ok(client)
    }

    pub fn stats(&self) -> BackendStats {
        self.counters.snapshot()
    }

    async fn send_check(&self, check: &PermissionCheck) -> Result<bool, AuthError> {
        let mut request = self
            .http
            .post(self.check_url.clone())
            .json(&CheckRequest::from(check));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::from_status(status.as_u16(), body));
        }

        let body: CheckResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                AuthError::Timeout
            } else {
                AuthError::Protocol(e.to_string())
            }
        })?;
        Ok(body.allowed)
    }
}

#[async_trait]
impl PermissionBackend for HttpPermissionClient {
    async fn check(&self, check: &PermissionCheck) -> Result<bool, AuthError> {
        let start = Instant::now();
        let outcome = self.send_check(check).await;
        let latency = start.elapsed();

        self.counters.record(&outcome, latency);
        let label = match &outcome {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::record_backend_call(label, latency);

        if let Err(e) = &outcome {
            tracing::debug!(
                subject = check.subject(),
                action = %check.action(),
                resource = %check.resource(),
                error = %e,
                "Permission backend call failed"
            );
        }
        outcome
    }

    async fn health_check(&self) -> Result<(), AuthError> {
        let mut request = self.http.get(self.health_url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AuthError::from_status(status.as_u16(), body))
        }
    }
}

impl std::fmt::Debug for HttpPermissionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPermissionClient")
            .field("check_url", &self.check_url.as_str())
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

fn transport_error(err: reqwest::Error) -> AuthError {
    if err.is_timeout() {
        AuthError::Timeout
    } else if err.is_decode() {
        AuthError::Protocol(err.to_string())
    } else {
        AuthError::Unreachable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_join_under_base_path() {
        let client = HttpPermissionClient::new(&BackendConfig {
            endpoint: "http://authz.internal:8443/api".to_string(),
            ..BackendConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.check_url.as_str(),
            "http://authz.internal:8443/api/v1/permissions/check"
        );
        assert_eq!(client.health_url.as_str(), "http://authz.internal:8443/api/healthz");
    }

    #[test]
    fn test_invalid_endpoint() {
        let err = HttpPermissionClient::new(&BackendConfig {
            endpoint: "not a url".to_string(),
            ..BackendConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, ClientBuildError::Endpoint(_)));
    }

    #[test]
    fn test_debug_hides_token() {
        let client = HttpPermissionClient::new(&BackendConfig {
            token: Some("s3cret".to_string()),
            ..BackendConfig::default()
        })
        .unwrap();
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("authenticated: true"));
    }
}
