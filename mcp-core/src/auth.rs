//! Authorization gate and provider contract.
//!
//! Token mechanics are deliberately opaque to the engine: an
//! [`AuthProvider`] issues and checks tokens, and [`gate`] wraps any method
//! handler with bearer-token enforcement. Expiry is judged against an
//! injected [`Clock`] so tests can move time instead of sleeping.
//!
//! The gate inspects `params.token`, verifies it, checks role membership,
//! and invokes the inner handler with the token stripped from the params.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AuthError, McpError, McpResult};

/// Epoch-seconds time source used for token expiry.
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn epoch_secs(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_secs(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// Manually-driven clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock starting at the given epoch second.
    pub fn starting_at(epoch_secs: i64) -> Self {
        Self {
            now: AtomicI64::new(epoch_secs),
        }
    }

    /// Move time forward.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn epoch_secs(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Claims carried by a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Subject the token was issued to
    pub sub: String,
    /// Roles granted to the subject
    pub roles: Vec<String>,
    /// Issued-at, epoch seconds
    pub iat: i64,
    /// Expiry, epoch seconds
    pub exp: i64,
}

/// Token issuing and verification contract.
///
/// Real deployments back this with a JWT library; the engine only relies on
/// the three operations below.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Issue a token for `sub` with the given roles and lifetime.
    async fn generate_token(&self, sub: &str, roles: &[String], ttl_secs: i64)
        -> McpResult<String>;

    /// Cheap boolean check: is the token known and unexpired?
    async fn validate_token(&self, token: &str) -> bool;

    /// Full verification returning the claims.
    ///
    /// Fails with `InvalidToken` for unknown tokens and `TokenExpired` when
    /// `exp` has passed.
    async fn verify_token(&self, token: &str) -> McpResult<TokenClaims>;
}

/// Provider issuing opaque UUID tokens backed by an in-memory claim table.
///
/// Good enough for tests and single-process demos; anything else should
/// implement [`AuthProvider`] over real signed tokens.
pub struct InMemoryAuthProvider {
    clock: Arc<dyn Clock>,
    tokens: Mutex<HashMap<String, TokenClaims>>,
}

impl InMemoryAuthProvider {
    /// Create a provider judging expiry against the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tokens: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl AuthProvider for InMemoryAuthProvider {
    async fn generate_token(
        &self,
        sub: &str,
        roles: &[String],
        ttl_secs: i64,
    ) -> McpResult<String> {
        let token = Uuid::new_v4().to_string();
        let now = self.clock.epoch_secs();
        self.tokens.lock().expect("token table poisoned").insert(
            token.clone(),
            TokenClaims {
                sub: sub.to_string(),
                roles: roles.to_vec(),
                iat: now,
                exp: now + ttl_secs,
            },
        );
        Ok(token)
    }

    async fn validate_token(&self, token: &str) -> bool {
        self.verify_token(token).await.is_ok()
    }

    async fn verify_token(&self, token: &str) -> McpResult<TokenClaims> {
        let claims = self
            .tokens
            .lock()
            .expect("token table poisoned")
            .get(token)
            .cloned()
            .ok_or(McpError::Auth(AuthError::InvalidToken {
                reason: "unknown token".to_string(),
            }))?;
        if claims.exp < self.clock.epoch_secs() {
            return Err(AuthError::TokenExpired.into());
        }
        Ok(claims)
    }
}

/// Method handler shape the gate composes over: raw params in, raw result
/// value out. Tool handlers have the same shape modulo the `Option`.
pub type MethodHandler =
    Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, McpResult<Value>> + Send + Sync>;

/// Wrap `inner` with bearer-token enforcement.
///
/// The returned handler rejects calls without a `token` param, with an
/// unverifiable or expired token, or whose token roles do not intersect
/// `required_roles` (an empty requirement admits any verified token). On
/// success `inner` runs with `token` stripped from the params.
pub fn gate(
    provider: Arc<dyn AuthProvider>,
    required_roles: Vec<String>,
    inner: MethodHandler,
) -> MethodHandler {
    Arc::new(move |params: Option<Value>| {
        let provider = provider.clone();
        let required_roles = required_roles.clone();
        let inner = inner.clone();
        Box::pin(async move {
            let token = params
                .as_ref()
                .and_then(|p| p.get("token"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(McpError::Auth(AuthError::MissingToken))?;

            let claims = provider.verify_token(&token).await?;

            if !required_roles.is_empty()
                && !claims.roles.iter().any(|role| required_roles.contains(role))
            {
                return Err(AuthError::InsufficientPermissions.into());
            }

            let stripped = params.map(|mut p| {
                if let Some(object) = p.as_object_mut() {
                    object.remove("token");
                }
                p
            });
            inner(stripped).await
        })
    })
}
