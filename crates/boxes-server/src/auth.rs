//! Request identity. Every box route resolves an [`Actor`] from the
//! `Authorization: Bearer <token>` header before any policy check runs.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use boxes_core::Actor;
use boxes_store::UserRepo;

use crate::error::ApiError;

/// Resolves a presented token to the user it belongs to.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok(None)` when the token matches no user.
    async fn authenticate(&self, token: &str) -> Result<Option<Actor>, ApiError>;
}

/// Token lookup against the user directory.
pub struct StoreAuthenticator {
    users: UserRepo,
}

impl StoreAuthenticator {
    pub fn new(users: UserRepo) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Authenticator for StoreAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Option<Actor>, ApiError> {
        let user = self.users.find_by_token(token)?;
        Ok(user.as_ref().map(Actor::from))
    }
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolve the actor for a request. A missing header is `NotAuthenticated`;
/// a header that does not resolve to a user is `InvalidToken`.
pub async fn require_actor(auth: &dyn Authenticator, headers: &HeaderMap) -> Result<Actor, ApiError> {
    if !headers.contains_key(header::AUTHORIZATION) {
        return Err(ApiError::NotAuthenticated);
    }
    let token = extract_bearer_token(headers).ok_or(ApiError::InvalidToken)?;
    auth.authenticate(token).await?.ok_or(ApiError::InvalidToken)
}
