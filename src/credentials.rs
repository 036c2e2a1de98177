use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::AppConfig, error::AppError, models::PasswordHash};

/// Lifetime of a session token, counted from issuance.
pub const TOKEN_TTL_MINUTES: i64 = 30;

/// Name of the cookie carrying the session token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Claims
///
/// Payload signed into every session token. Only the account id is embedded; the role
/// is re-read from the record store on each request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the account id.
    pub sub: Uuid,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: usize,
    /// Issued At (iat), seconds since the epoch.
    pub iat: usize,
}

/// Credentials
///
/// Password hashing (bcrypt) and session token issuance/verification (HS256 JWT).
/// Cheap to clone; one instance lives in the application state.
#[derive(Clone)]
pub struct Credentials {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    hash_cost: u32,
}

impl Credentials {
    pub fn new(secret: &str, hash_cost: u32) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            hash_cost,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.jwt_secret, config.password_hash_cost)
    }

    /// Hashes a plaintext password with a fresh random salt.
    ///
    /// This is CPU-heavy; async callers should run it on the blocking pool.
    pub fn hash_password(&self, password: &str) -> Result<PasswordHash, AppError> {
        bcrypt::hash(password, self.hash_cost)
            .map(PasswordHash::from_hashed)
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
    }

    /// Returns false on mismatch and on a hash that cannot be parsed.
    pub fn verify_password(&self, password: &str, hash: &PasswordHash) -> bool {
        bcrypt::verify(password, hash.as_str()).unwrap_or(false)
    }

    pub fn issue_token(&self, account_id: Uuid) -> Result<String, AppError> {
        self.issue_token_at(account_id, Utc::now())
    }

    /// Issues a token as if it had been signed at `issued_at`.
    pub fn issue_token_at(
        &self,
        account_id: Uuid,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let expires_at = issued_at + Duration::minutes(TOKEN_TTL_MINUTES);
        let claims = Claims {
            sub: account_id,
            iat: issued_at.timestamp().max(0) as usize,
            exp: expires_at.timestamp().max(0) as usize,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
    }

    /// verify_token
    ///
    /// Resolves a presented token to the account id it was issued for.
    ///
    /// * no token → [`AppError::Unauthenticated`]
    /// * malformed, tampered, or expired token → [`AppError::SessionExpired`]
    pub fn verify_token(&self, token: Option<&str>) -> Result<Uuid, AppError> {
        let token = match token {
            Some(t) if !t.trim().is_empty() => t.trim(),
            _ => return Err(AppError::Unauthenticated),
        };

        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.leeway = 0;

        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(data.claims.sub),
            Err(e) => {
                match e.kind() {
                    ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
                    other => tracing::debug!(kind = ?other, "rejected invalid token"),
                }
                Err(AppError::SessionExpired)
            }
        }
    }
}
