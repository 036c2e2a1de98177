use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::{
    credentials::{ACCESS_TOKEN_COOKIE, Credentials},
    error::AppError,
    models::Role,
    repository::RepositoryState,
};

/// AuthUser
///
/// The resolved identity of an authenticated request. The role is always the one
/// currently stored for the account, never a value carried inside the token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// AuthUser Extractor Implementation
///
/// Makes AuthUser usable as a handler argument, separating authentication from the
/// recipe logic. An identity already resolved by the route guard is reused from the
/// request extensions; otherwise resolution runs in one awaited pass:
/// 1. Token Extraction: the `access_token` cookie, else an `Authorization: Bearer` header.
/// 2. Token Validation: signature and expiry through [`Credentials::verify_token`].
/// 3. DB Lookup: the account must still exist; its current role is loaded.
///
/// Rejection: `Unauthenticated` when no token was sent or the account is gone,
/// `SessionExpired` when the token is invalid or expired.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    Credentials: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let credentials = Credentials::from_ref(state);

        let token = session_token(parts);
        let account_id = credentials.verify_token(token.as_deref())?;

        let account = repo
            .get_account(account_id)
            .await?
            // A valid token for a deleted account is treated like no session at all.
            .ok_or(AppError::Unauthenticated)?;

        Ok(AuthUser {
            id: account.id,
            role: account.role,
        })
    }
}

/// session_token
///
/// The token presented with the request, if any. The cookie takes precedence.
pub fn session_token(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(cookie) = jar.get(ACCESS_TOKEN_COOKIE) {
        return Some(cookie.value().to_string());
    }

    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// authorize
///
/// Ownership check for mutations: allowed for the owner of the resource or an admin.
/// Callers must have confirmed the resource exists first.
pub fn authorize(user: &AuthUser, owner_id: Uuid, denial: &str) -> Result<(), AppError> {
    if user.id == owner_id || user.is_admin() {
        Ok(())
    } else {
        tracing::debug!(user = %user.id, owner = %owner_id, "ownership check denied");
        Err(AppError::Forbidden(denial.to_string()))
    }
}
