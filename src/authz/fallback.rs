//! Conservative policy used when the permission service cannot answer.
//!
//! Rules, first match wins:
//!
//! 1. Health and liveness probes may be read.
//! 2. A subject may read a resource it owns.
//! 3. Anyone may read a public resource.
//! 4. Everything else is denied.
//!
//! Only `Read` can ever be allowed. Write, create, update, delete and admin
//! are denied whatever the subject or resource.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::authz::types::PermissionCheck;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackRule {
    HealthCheck,
    OwnerRead,
    PublicRead,
    DefaultDeny,
}

impl FallbackRule {
    pub fn allows(&self) -> bool {
        !matches!(self, FallbackRule::DefaultDeny)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackRule::HealthCheck => "health_check",
            FallbackRule::OwnerRead => "owner_read",
            FallbackRule::PublicRead => "public_read",
            FallbackRule::DefaultDeny => "default_deny",
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            FallbackRule::HealthCheck => "health checks stay readable while degraded",
            FallbackRule::OwnerRead => "owners may read their own resources while degraded",
            FallbackRule::PublicRead => "public resources stay readable while degraded",
            FallbackRule::DefaultDeny => "denied by conservative degraded-mode policy",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FallbackStats {
    pub total_checks: u64,
    pub allowed: u64,
    pub denied: u64,
    pub health_checks: u64,
    pub owner_reads: u64,
    pub public_reads: u64,
}

#[derive(Debug, Default)]
pub struct FallbackAuthorizer {
    total_checks: AtomicU64,
    allowed: AtomicU64,
    denied: AtomicU64,
    health_checks: AtomicU64,
    owner_reads: AtomicU64,
    public_reads: AtomicU64,
}

impl FallbackAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Which rule decides `check`. Pure; touches no counters.
    pub fn classify(check: &PermissionCheck) -> FallbackRule {
        if !check.action().is_read() {
            return FallbackRule::DefaultDeny;
        }

        let resource = check.resource();
        if resource.is_health_check() {
            FallbackRule::HealthCheck
        } else if resource.owner() == Some(check.subject_id()) {
            FallbackRule::OwnerRead
        } else if resource.is_public() {
            FallbackRule::PublicRead
        } else {
            FallbackRule::DefaultDeny
        }
    }

    pub fn evaluate(&self, check: &PermissionCheck) -> bool {
        let rule = Self::classify(check);

        self.total_checks.fetch_add(1, Ordering::Relaxed);
        let counter = match rule {
            FallbackRule::HealthCheck => Some(&self.health_checks),
            FallbackRule::OwnerRead => Some(&self.owner_reads),
            FallbackRule::PublicRead => Some(&self.public_reads),
            FallbackRule::DefaultDeny => None,
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        if rule.allows() {
            self.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.denied.fetch_add(1, Ordering::Relaxed);
        }

        metrics::record_fallback(rule);
        tracing::debug!(
            subject = check.subject(),
            action = %check.action(),
            resource = %check.resource(),
            rule = rule.as_str(),
            allowed = rule.allows(),
            "fallback policy applied"
        );
        rule.allows()
    }

    pub fn stats(&self) -> FallbackStats {
        FallbackStats {
            total_checks: self.total_checks.load(Ordering::Relaxed),
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            health_checks: self.health_checks.load(Ordering::Relaxed),
            owner_reads: self.owner_reads.load(Ordering::Relaxed),
            public_reads: self.public_reads.load(Ordering::Relaxed),
        }
    }
}
