//! Caller identity resolution.
//!
//! A request names its owner either by UID (`jwt-sub`, set by the gateway)
//! or by ID (`owner-id`). [`resolve_caller_owner`] turns that into an
//! [`Owner`] through an [`IdentityLookup`] backend under a fixed deadline.
//! This is the only place identity lookups happen; services take the
//! resolved owner.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conduit_config::{IdentityBackend, IdentityConfig};
use conduit_types::{HEADER_OWNER_ID, HEADER_OWNER_UID, Owner, RequestMetadata};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DomainError, Result};

/// Failure of a single identity lookup.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("user not found: {0}")]
    NotFound(String),

    #[error("identity backend error: {0}")]
    Backend(String),
}

/// Backend resolving owner identifiers to owner records.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Resolve by human-readable ID (`users/<id>`).
    async fn get_user(&self, id: &str) -> std::result::Result<Owner, LookupError>;

    /// Resolve by UID (`users/<uid>` permalink).
    async fn lookup_user(&self, uid: Uuid) -> std::result::Result<Owner, LookupError>;
}

/// Resolve the owner of a request.
///
/// The UID header wins when present. A UID that does not parse, a lookup
/// miss, a backend error, and a timeout all fail with `NotFound`. With
/// neither header the request is `Unauthenticated`.
pub async fn resolve_caller_owner(
    metadata: &RequestMetadata,
    lookup: &dyn IdentityLookup,
    timeout: Duration,
) -> Result<Owner> {
    let not_found = || DomainError::NotFound("owner not found".to_string());

    if let Some(uid) = metadata.single(HEADER_OWNER_UID) {
        let uid = Uuid::parse_str(uid).map_err(|_| not_found())?;
        return match tokio::time::timeout(timeout, lookup.lookup_user(uid)).await {
            Ok(Ok(owner)) => Ok(owner),
            Ok(Err(e)) => {
                debug!(owner_uid = %uid, error = %e, "Owner lookup failed");
                Err(not_found())
            }
            Err(_) => {
                warn!(owner_uid = %uid, "Owner lookup timed out");
                Err(not_found())
            }
        };
    }

    let Some(id) = metadata.single(HEADER_OWNER_ID) else {
        return Err(DomainError::Unauthenticated(
            "no owner identity in request".to_string(),
        ));
    };
    match tokio::time::timeout(timeout, lookup.get_user(id)).await {
        Ok(Ok(owner)) => Ok(owner),
        Ok(Err(e)) => {
            debug!(owner_id = %id, error = %e, "Owner lookup failed");
            Err(not_found())
        }
        Err(_) => {
            warn!(owner_id = %id, "Owner lookup timed out");
            Err(not_found())
        }
    }
}

/// Attach `default_owner_id` when the request names no owner ID.
pub fn with_default_owner(mut metadata: RequestMetadata, default_owner_id: &str) -> RequestMetadata {
    if !default_owner_id.is_empty() && !metadata.contains(HEADER_OWNER_ID) {
        metadata.append(HEADER_OWNER_ID, default_owner_id);
    }
    metadata
}

/// Identity lookup plus the settings that go with it.
#[derive(Clone)]
pub struct IdentityResolver {
    lookup: Arc<dyn IdentityLookup>,
    timeout: Duration,
    default_owner_id: String,
}

impl IdentityResolver {
    pub fn new(lookup: Arc<dyn IdentityLookup>, timeout: Duration) -> Self {
        Self {
            lookup,
            timeout,
            default_owner_id: String::new(),
        }
    }

    pub fn with_default_owner_id(mut self, id: impl Into<String>) -> Self {
        self.default_owner_id = id.into();
        self
    }

    /// Build the configured backend.
    pub fn from_config(config: &IdentityConfig) -> Result<Self> {
        let lookup: Arc<dyn IdentityLookup> = match config.backend {
            IdentityBackend::Static => Arc::new(StaticIdentityLookup::from_config(config)?),
            IdentityBackend::Http => {
                let url = config.url.as_deref().ok_or_else(|| {
                    DomainError::Config("identity.url is required for the http backend".into())
                })?;
                Arc::new(HttpIdentityLookup::new(url)?)
            }
        };
        Ok(Self::new(lookup, config.lookup_timeout())
            .with_default_owner_id(config.default_owner_id.clone()))
    }

    /// Resolve the owner of a request, applying the default owner ID first.
    pub async fn resolve(&self, metadata: &RequestMetadata) -> Result<Owner> {
        let metadata = with_default_owner(metadata.clone(), &self.default_owner_id);
        resolve_caller_owner(&metadata, self.lookup.as_ref(), self.timeout).await
    }
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("timeout", &self.timeout)
            .field("default_owner_id", &self.default_owner_id)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Static backend
// ─────────────────────────────────────────────────────────────────────────────

/// Users known up front.
#[derive(Debug, Default, Clone)]
pub struct StaticIdentityLookup {
    by_id: HashMap<String, Owner>,
    by_uid: HashMap<Uuid, Owner>,
}

impl StaticIdentityLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, owner: Owner) -> Self {
        self.by_uid.insert(owner.uid, owner.clone());
        self.by_id.insert(owner.id.clone(), owner);
        self
    }

    pub fn from_config(config: &IdentityConfig) -> Result<Self> {
        config.users.iter().try_fold(Self::new(), |lookup, user| {
            let uid = Uuid::parse_str(&user.uid).map_err(|_| {
                DomainError::Config(format!("identity user '{}' has invalid uid", user.id))
            })?;
            Ok(lookup.with_user(Owner {
                uid,
                id: user.id.clone(),
            }))
        })
    }
}

#[async_trait]
impl IdentityLookup for StaticIdentityLookup {
    async fn get_user(&self, id: &str) -> std::result::Result<Owner, LookupError> {
        self.by_id
            .get(id)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(format!("users/{id}")))
    }

    async fn lookup_user(&self, uid: Uuid) -> std::result::Result<Owner, LookupError> {
        self.by_uid
            .get(&uid)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(format!("users/{uid}")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP backend
// ─────────────────────────────────────────────────────────────────────────────

/// Management backend reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpIdentityLookup {
    http: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    user: Owner,
}

impl HttpIdentityLookup {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| DomainError::Config(format!("invalid identity url: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .user_agent(format!("conduit/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DomainError::Config(e.to_string()))?;
        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> std::result::Result<Url, LookupError> {
        self.base_url
            .join(path)
            .map_err(|e| LookupError::Backend(e.to_string()))
    }

    async fn fetch(
        &self,
        request: reqwest::RequestBuilder,
        what: String,
    ) -> std::result::Result<Owner, LookupError> {
        let response = request
            .send()
            .await
            .map_err(|e| LookupError::Backend(e.to_string()))?;
        match response.status() {
            s if s.is_success() => response
                .json::<UserResponse>()
                .await
                .map(|r| r.user)
                .map_err(|e| LookupError::Backend(e.to_string())),
            StatusCode::NOT_FOUND => Err(LookupError::NotFound(what)),
            s => Err(LookupError::Backend(format!("HTTP {}", s.as_u16()))),
        }
    }
}

#[async_trait]
impl IdentityLookup for HttpIdentityLookup {
    async fn get_user(&self, id: &str) -> std::result::Result<Owner, LookupError> {
        let url = self.url(&format!("v1alpha/admin/users/{id}"))?;
        self.fetch(self.http.get(url), format!("users/{id}")).await
    }

    async fn lookup_user(&self, uid: Uuid) -> std::result::Result<Owner, LookupError> {
        let url = self.url("v1alpha/admin/users:lookup")?;
        let permalink = format!("users/{uid}");
        let request = self.http.get(url).query(&[("permalink", permalink.as_str())]);
        self.fetch(request, permalink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Owner {
        Owner {
            uid: Uuid::parse_str("9f0c6a2e-5b1d-4b8e-a1c4-2d7f3e6b9a10").unwrap(),
            id: "alice".into(),
        }
    }

    fn lookup() -> StaticIdentityLookup {
        StaticIdentityLookup::new().with_user(alice())
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Never answers.
    struct Hanging;

    #[async_trait]
    impl IdentityLookup for Hanging {
        async fn get_user(&self, _id: &str) -> std::result::Result<Owner, LookupError> {
            std::future::pending().await
        }
        async fn lookup_user(&self, _uid: Uuid) -> std::result::Result<Owner, LookupError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_uid_header_wins() {
        let md = RequestMetadata::new()
            .with(HEADER_OWNER_UID, alice().uid.to_string())
            .with(HEADER_OWNER_ID, "someone-else");
        let owner = resolve_caller_owner(&md, &lookup(), TIMEOUT).await.unwrap();
        assert_eq!(owner, alice());
    }

    #[tokio::test]
    async fn test_id_header_fallback() {
        let md = RequestMetadata::new().with(HEADER_OWNER_ID, "alice");
        let owner = resolve_caller_owner(&md, &lookup(), TIMEOUT).await.unwrap();
        assert_eq!(owner.permalink(), format!("users/{}", alice().uid));
    }

    #[tokio::test]
    async fn test_no_headers_is_unauthenticated() {
        let err = resolve_caller_owner(&RequestMetadata::new(), &lookup(), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_repeated_id_header_is_unauthenticated() {
        let md = RequestMetadata::new()
            .with(HEADER_OWNER_ID, "alice")
            .with(HEADER_OWNER_ID, "bob");
        let err = resolve_caller_owner(&md, &lookup(), TIMEOUT).await.unwrap_err();
        assert!(matches!(err, DomainError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_malformed_uid_is_not_found() {
        let md = RequestMetadata::new().with(HEADER_OWNER_UID, "not-a-uuid");
        let err = resolve_caller_owner(&md, &lookup(), TIMEOUT).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_owner_is_not_found() {
        let md = RequestMetadata::new().with(HEADER_OWNER_ID, "mallory");
        let err = resolve_caller_owner(&md, &lookup(), TIMEOUT).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_not_found() {
        let md = RequestMetadata::new().with(HEADER_OWNER_ID, "alice");
        let err = resolve_caller_owner(&md, &Hanging, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn test_default_owner_only_when_absent() {
        let md = with_default_owner(RequestMetadata::new(), "local-user");
        assert_eq!(md.single(HEADER_OWNER_ID), Some("local-user"));

        let md = with_default_owner(
            RequestMetadata::new().with(HEADER_OWNER_ID, "alice"),
            "local-user",
        );
        assert_eq!(md.get_all(HEADER_OWNER_ID), ["alice".to_string()]);

        let md = with_default_owner(RequestMetadata::new(), "");
        assert!(!md.contains(HEADER_OWNER_ID));
    }

    #[tokio::test]
    async fn test_resolver_applies_default() {
        let resolver = IdentityResolver::new(Arc::new(lookup()), TIMEOUT)
            .with_default_owner_id("alice");
        let owner = resolver.resolve(&RequestMetadata::new()).await.unwrap();
        assert_eq!(owner, alice());
    }

    #[test]
    fn test_static_from_config_rejects_bad_uid() {
        let config = IdentityConfig {
            users: vec![conduit_config::StaticUser {
                uid: "nope".into(),
                id: "alice".into(),
            }],
            ..Default::default()
        };
        assert!(StaticIdentityLookup::from_config(&config).is_err());
    }

    #[test]
    fn test_http_lookup_url_join() {
        let lookup = HttpIdentityLookup::new("http://mgmt:8084/base").unwrap();
        let url = lookup.url("v1alpha/admin/users/alice").unwrap();
        assert_eq!(url.as_str(), "http://mgmt:8084/base/v1alpha/admin/users/alice");
    }
}
