//! The single entry point for permission checks.
//!
//! # Decision Flow
//! ```text
//! authorize(subject, action, resource)
//!     → validate input (only hard error besides a backend rejection)
//!     → cache hit?                       → (true, Cache)
//!     → breaker(retry(backend.check))
//!         Ok(allowed)                    → cache grant (default TTL), LiveService
//!         Open / timeout / transient     → fallback policy
//!             grant                      → cache grant (extended TTL), Fallback
//!             deny                       → Fallback
//!     → audit record, metrics
//! ```
//!
//! Suspension points are the cache write gate, the backend RPC and the
//! sleeps between retries; dropping the `authorize` future cancels all of
//! them without leaving the breaker or cache inconsistent.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::authz::audit::{AuditRecord, AuditSink, TracingAuditSink};
use crate::authz::fallback::FallbackAuthorizer;
use crate::authz::health::{self, HealthReport};
use crate::authz::types::{
    ActionKind, CheckInputError, DecisionSource, PermissionCheck, PermissionResult, ResourceRef,
};
use crate::backend::{AuthError, PermissionBackend};
use crate::cache::AuthDecisionCache;
use crate::config::{AuthzConfig, CacheConfig, CircuitConfig};
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;
use crate::resilience::{CircuitBreaker, CircuitError, RetryExecutor};

#[derive(Debug, Error)]
pub enum AuthorizeError {
    #[error("invalid permission check: {0}")]
    InvalidInput(#[from] CheckInputError),

    /// The backend answered that the request itself is malformed.
    #[error("permission backend rejected the check: {0}")]
    Rejected(String),
}

pub struct AuthorizationCoordinator {
    backend: Arc<dyn PermissionBackend>,
    cache: Arc<AuthDecisionCache>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryExecutor,
    fallback: Arc<FallbackAuthorizer>,
    audit: Arc<dyn AuditSink>,
}

impl AuthorizationCoordinator {
    pub fn builder(backend: Arc<dyn PermissionBackend>) -> CoordinatorBuilder {
        CoordinatorBuilder {
            backend,
            cache: None,
            breaker: None,
            retry: None,
            fallback: None,
            audit: None,
        }
    }

    /// Wire every component from a loaded config.
    pub fn from_config(config: &AuthzConfig, backend: Arc<dyn PermissionBackend>) -> Self {
        Self::builder(backend)
            .cache(Arc::new(AuthDecisionCache::new(config.cache.clone())))
            .breaker(Arc::new(CircuitBreaker::new(&config.circuit)))
            .retry(RetryExecutor::from_config(&config.retry))
            .build()
    }

    pub async fn authorize(
        &self,
        subject: &str,
        action: ActionKind,
        resource: ResourceRef,
    ) -> Result<PermissionResult, AuthorizeError> {
        let check = PermissionCheck::new(subject, action, resource)?;
        self.check(&check).await
    }

    pub async fn check(&self, check: &PermissionCheck) -> Result<PermissionResult, AuthorizeError> {
        let start = Instant::now();
        let key = check.cache_key();

        if self.cache.get(&key) == Some(true) {
            return Ok(self.finish(check, true, DecisionSource::Cache, start));
        }

        // A rejection is an answer, not an outage: keep it out of the
        // breaker's failure count by returning it as a successful call.
        let outcome = self
            .breaker
            .call(|| async {
                match self.retry.run(|| self.backend.check(check)).await {
                    Err(AuthError::Rejected(reason)) => Ok(Err(reason)),
                    other => other.map(Ok),
                }
            })
            .await;

        match outcome {
            Ok(Ok(allowed)) => {
                if allowed {
                    self.cache.set(key, self.cache.default_ttl()).await;
                }
                Ok(self.finish(check, allowed, DecisionSource::LiveService, start))
            }
            Ok(Err(reason)) => {
                tracing::warn!(
                    subject = check.subject(),
                    action = %check.action(),
                    resource = %check.resource(),
                    reason = %reason,
                    "permission backend rejected check"
                );
                metrics::record_rejected_check();
                self.audit.record(&AuditRecord::new(
                    check.clone(),
                    false,
                    DecisionSource::LiveService,
                    start.elapsed(),
                ));
                Err(AuthorizeError::Rejected(reason))
            }
            Err(err) => {
                match &err {
                    CircuitError::Open => {
                        tracing::debug!(resource = %check.resource(), "circuit open, using fallback policy")
                    }
                    other => tracing::warn!(
                        resource = %check.resource(),
                        error = %other,
                        "permission backend failed, using fallback policy"
                    ),
                }

                let allowed = self.fallback.evaluate(check);
                if allowed {
                    self.cache.set(key, self.cache.extended_ttl()).await;
                }
                Ok(self.finish(check, allowed, DecisionSource::Fallback, start))
            }
        }
    }

    pub async fn health(&self) -> HealthReport {
        health::assess(self.backend.as_ref(), &self.breaker, self.breaker.call_timeout()).await
    }

    pub fn cache(&self) -> &Arc<AuthDecisionCache> {
        &self.cache
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn fallback(&self) -> &Arc<FallbackAuthorizer> {
        &self.fallback
    }

    fn finish(
        &self,
        check: &PermissionCheck,
        allowed: bool,
        source: DecisionSource,
        start: Instant,
    ) -> PermissionResult {
        let latency = start.elapsed();
        self.audit
            .record(&AuditRecord::new(check.clone(), allowed, source, latency));
        metrics::record_decision(source, allowed, latency);

        PermissionResult {
            allowed,
            source,
            latency,
        }
    }
}

impl std::fmt::Debug for AuthorizationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationCoordinator")
            .field("cache", &self.cache.stats())
            .field("breaker", &self.breaker)
            .field("retry_attempts", &self.retry.max_attempts())
            .finish()
    }
}

/// Assembles a coordinator; unset components get config defaults.
pub struct CoordinatorBuilder {
    backend: Arc<dyn PermissionBackend>,
    cache: Option<Arc<AuthDecisionCache>>,
    breaker: Option<Arc<CircuitBreaker>>,
    retry: Option<RetryExecutor>,
    fallback: Option<Arc<FallbackAuthorizer>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl CoordinatorBuilder {
    pub fn cache(mut self, cache: Arc<AuthDecisionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn fallback(mut self, fallback: Arc<FallbackAuthorizer>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn build(self) -> AuthorizationCoordinator {
        AuthorizationCoordinator {
            backend: self.backend,
            cache: self
                .cache
                .unwrap_or_else(|| Arc::new(AuthDecisionCache::new(CacheConfig::default()))),
            breaker: self
                .breaker
                .unwrap_or_else(|| Arc::new(CircuitBreaker::new(&CircuitConfig::default()))),
            retry: self
                .retry
                .unwrap_or_else(|| RetryExecutor::new(1, Backoff::none())),
            fallback: self.fallback.unwrap_or_default(),
            audit: self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::audit::ChannelAuditSink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Plays back scripted answers, repeating the last one.
    struct Scripted {
        answers: Mutex<Vec<Result<bool, AuthError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(answers: Vec<Result<bool, AuthError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PermissionBackend for Scripted {
        async fn check(&self, _check: &PermissionCheck) -> Result<bool, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut answers = self.answers.lock().unwrap();
            if answers.len() > 1 {
                answers.remove(0)
            } else {
                answers[0].clone()
            }
        }
    }

    fn note(owner: &str) -> ResourceRef {
        ResourceRef::new("note", "1").owned_by(owner)
    }

    #[tokio::test]
    async fn test_live_grant_is_cached() {
        let backend = Scripted::new(vec![Ok(true)]);
        let coordinator = AuthorizationCoordinator::builder(backend.clone()).build();

        let first = coordinator.authorize("alice", ActionKind::Read, note("bob")).await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.source, DecisionSource::LiveService);

        let second = coordinator.authorize("alice", ActionKind::Read, note("bob")).await.unwrap();
        assert_eq!(second.source, DecisionSource::Cache);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_live_denial_is_not_cached() {
        let backend = Scripted::new(vec![Ok(false)]);
        let coordinator = AuthorizationCoordinator::builder(backend.clone()).build();

        for _ in 0..2 {
            let result = coordinator.authorize("bob", ActionKind::Write, note("alice")).await.unwrap();
            assert!(!result.allowed);
            assert_eq!(result.source, DecisionSource::LiveService);
        }
        assert_eq!(backend.calls(), 2);
        assert_eq!(coordinator.cache().size(), 0);
    }

    #[tokio::test]
    async fn test_outage_falls_back() {
        let backend = Scripted::new(vec![Err(AuthError::Unavailable(503))]);
        let coordinator = AuthorizationCoordinator::builder(backend).build();

        let owner = coordinator.authorize("alice", ActionKind::Read, note("alice")).await.unwrap();
        assert!(owner.allowed);
        assert_eq!(owner.source, DecisionSource::Fallback);

        let stranger = coordinator.authorize("bob", ActionKind::Read, note("alice")).await.unwrap();
        assert!(!stranger.allowed);
        assert_eq!(stranger.source, DecisionSource::Fallback);
    }

    #[tokio::test]
    async fn test_fallback_grant_uses_extended_ttl() {
        let backend = Scripted::new(vec![Err(AuthError::Timeout), Ok(false)]);
        let cache = Arc::new(AuthDecisionCache::new(CacheConfig {
            default_ttl_secs: 1,
            extended_ttl_secs: 3_600,
            ..CacheConfig::default()
        }));
        let coordinator = AuthorizationCoordinator::builder(backend.clone())
            .cache(cache)
            .build();

        let first = coordinator.authorize("alice", ActionKind::Read, note("alice")).await.unwrap();
        assert_eq!(first.source, DecisionSource::Fallback);

        tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;
        let again = coordinator.authorize("alice", ActionKind::Read, note("alice")).await.unwrap();
        assert_eq!(again.source, DecisionSource::Cache);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_an_error_and_not_a_circuit_failure() {
        let backend = Scripted::new(vec![Err(AuthError::Rejected("bad resource".into()))]);
        let coordinator = AuthorizationCoordinator::builder(backend).build();

        let err = coordinator
            .authorize("alice", ActionKind::Read, note("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorizeError::Rejected(_)));
        assert_eq!(coordinator.breaker().stats().failed, 0);
    }

    #[tokio::test]
    async fn test_rejection_is_audited_as_live_denial() {
        let backend = Scripted::new(vec![Err(AuthError::Rejected("bad resource".into()))]);
        let (sink, mut rx) = ChannelAuditSink::new(4);
        let coordinator = AuthorizationCoordinator::builder(backend)
            .audit(Arc::new(sink))
            .build();

        let result = coordinator.authorize("alice", ActionKind::Read, note("alice")).await;
        assert!(result.is_err());

        let record = rx.try_recv().unwrap();
        assert!(!record.allowed);
        assert_eq!(record.source, DecisionSource::LiveService);
        assert_eq!(record.check.subject(), "alice");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_subject_is_invalid_input() {
        let backend = Scripted::new(vec![Ok(true)]);
        let coordinator = AuthorizationCoordinator::builder(backend.clone()).build();

        let err = coordinator
            .authorize("", ActionKind::Read, note("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorizeError::InvalidInput(CheckInputError::EmptySubject)));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_every_decision_is_audited() {
        let backend = Scripted::new(vec![Ok(true), Err(AuthError::Timeout)]);
        let (sink, mut rx) = ChannelAuditSink::new(16);
        let coordinator = AuthorizationCoordinator::builder(backend)
            .audit(Arc::new(sink))
            .build();

        coordinator.authorize("alice", ActionKind::Read, note("bob")).await.unwrap();
        coordinator.authorize("alice", ActionKind::Read, note("bob")).await.unwrap();
        coordinator.authorize("carol", ActionKind::Delete, note("bob")).await.unwrap();

        let sources: Vec<_> = (0..3).map(|_| rx.try_recv().unwrap().source).collect();
        assert_eq!(
            sources,
            vec![
                DecisionSource::LiveService,
                DecisionSource::Cache,
                DecisionSource::Fallback
            ]
        );
    }
}
