//! Value types shared by every authorization component.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheKey;

/// A permission check that cannot be evaluated at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckInputError {
    #[error("subject must not be empty")]
    EmptySubject,

    #[error("resource must not be empty")]
    EmptyResource,

    #[error("malformed resource reference '{0}', expected type:id")]
    MalformedResource(String),

    #[error("unknown action '{0}'")]
    UnknownAction(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Read,
    Write,
    Create,
    Update,
    Delete,
    Admin,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Read => "read",
            ActionKind::Write => "write",
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
            ActionKind::Admin => "admin",
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, ActionKind::Read)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = CheckInputError;

    /// Accepts the canonical names plus common verb aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" | "get" | "list" | "view" | "show" => Ok(ActionKind::Read),
            "write" | "edit" | "modify" | "put" | "patch" => Ok(ActionKind::Write),
            "create" | "post" => Ok(ActionKind::Create),
            "update" => Ok(ActionKind::Update),
            "delete" | "remove" => Ok(ActionKind::Delete),
            "admin" | "manage" | "configure" => Ok(ActionKind::Admin),
            _ => Err(CheckInputError::UnknownAction(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

/// Resource kinds whose second segment names the owner (`notes:alice:42`).
pub const OWNER_NAMESPACED_KINDS: &[&str] = &["notes"];

/// A typed reference to the thing being accessed.
///
/// Ownership and visibility are optional hints supplied by callers (or
/// derived from the reference string). Only the fallback policy reads them;
/// the live service decides on its own data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    kind: String,
    id: String,
    owner: Option<String>,
    visibility: Visibility,
}

impl ResourceRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            owner: None,
            visibility: Visibility::Private,
        }
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn public(mut self) -> Self {
        self.visibility = Visibility::Public;
        self
    }

    /// Parse `type:id`, `notes:owner:id`, `public:...` or `system:health`.
    ///
    /// Only kinds in [`OWNER_NAMESPACED_KINDS`] read the second segment as
    /// the owner; for any other kind a middle segment is just part of the id
    /// and ownership must come from [`owned_by`](Self::owned_by). The id
    /// keeps everything after the type, so the reference round-trips through
    /// [`Display`](fmt::Display).
    pub fn parse(s: &str) -> Result<Self, CheckInputError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CheckInputError::EmptyResource);
        }

        let (kind, id) = s
            .split_once(':')
            .filter(|(kind, id)| !kind.is_empty() && !id.is_empty())
            .ok_or_else(|| CheckInputError::MalformedResource(s.to_string()))?;

        let mut resource = ResourceRef::new(kind, id);
        if let Some((owner, rest)) = id
            .split_once(':')
            .filter(|_| OWNER_NAMESPACED_KINDS.contains(&kind))
        {
            if !owner.is_empty() && !rest.is_empty() {
                resource.owner = Some(owner.to_string());
            }
        }
        if kind == "public" {
            resource.visibility = Visibility::Public;
        }
        Ok(resource)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    /// Liveness probes: `health:*` or `system:health[...]`.
    pub fn is_health_check(&self) -> bool {
        self.kind == "health"
            || (self.kind == "system"
                && (self.id == "health" || self.id.starts_with("health:")))
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for ResourceRef {
    type Err = CheckInputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceRef::parse(s)
    }
}

/// One question put to the authorization layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PermissionCheck {
    subject: String,
    action: ActionKind,
    resource: ResourceRef,
}

impl PermissionCheck {
    /// Rejects an empty subject or a resource with an empty type or id.
    pub fn new(
        subject: impl Into<String>,
        action: ActionKind,
        resource: ResourceRef,
    ) -> Result<Self, CheckInputError> {
        let subject = subject.into();
        if subject.trim().is_empty() {
            return Err(CheckInputError::EmptySubject);
        }
        if resource.kind.trim().is_empty() || resource.id.trim().is_empty() {
            return Err(CheckInputError::EmptyResource);
        }
        Ok(Self {
            subject,
            action,
            resource,
        })
    }

    /// The check issued by backend health probes.
    pub fn health_probe() -> Self {
        Self {
            subject: "system".to_string(),
            action: ActionKind::Read,
            resource: ResourceRef::new("system", "health"),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Subject without a `user:` type prefix.
    pub fn subject_id(&self) -> &str {
        self.subject
            .strip_prefix("user:")
            .unwrap_or(&self.subject)
    }

    pub fn action(&self) -> ActionKind {
        self.action
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.subject, self.action, &self.resource)
    }
}

impl fmt::Display for PermissionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.action, self.resource)
    }
}

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Cache,
    LiveService,
    Fallback,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::Cache => "cache",
            DecisionSource::LiveService => "live_service",
            DecisionSource::Fallback => "fallback",
        }
    }
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEGRADED_DENIAL: &str =
    "authorization service degraded, conservative policy in effect";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PermissionResult {
    pub allowed: bool,
    pub source: DecisionSource,
    pub latency: Duration,
}

impl PermissionResult {
    pub fn is_degraded(&self) -> bool {
        self.source == DecisionSource::Fallback
    }

    /// User-facing text for a denial, `None` when allowed.
    pub fn denial_message(&self) -> Option<&'static str> {
        match (self.allowed, self.source) {
            (true, _) => None,
            (false, DecisionSource::Fallback) => Some(DEGRADED_DENIAL),
            (false, _) => Some("permission denied"),
        }
    }
}
