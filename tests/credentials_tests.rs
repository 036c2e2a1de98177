use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use recipe_portal::{
    credentials::{Claims, Credentials, TOKEN_TTL_MINUTES},
    error::AppError,
};
use uuid::Uuid;

const SECRET: &str = "credentials-test-secret";
// Lowest bcrypt cost, keeps the suite fast.
const TEST_COST: u32 = 4;

fn credentials() -> Credentials {
    Credentials::new(SECRET, TEST_COST)
}

// --- Passwords ---

#[test]
fn test_hash_then_verify() {
    let creds = credentials();
    let hash = creds.hash_password("correct horse").expect("hashing failed");

    assert_ne!(hash.as_str(), "correct horse", "hash must not be the plaintext");
    assert!(creds.verify_password("correct horse", &hash));
    assert!(!creds.verify_password("wrong horse", &hash));
}

#[test]
fn test_hash_is_salted() {
    let creds = credentials();
    let a = creds.hash_password("same").unwrap();
    let b = creds.hash_password("same").unwrap();
    assert_ne!(a.as_str(), b.as_str());
    assert!(creds.verify_password("same", &a));
    assert!(creds.verify_password("same", &b));
}

#[test]
fn test_hash_debug_is_redacted() {
    let hash = credentials().hash_password("secret").unwrap();
    let rendered = format!("{hash:?}");
    assert!(!rendered.contains(hash.as_str()));
}

// --- Tokens ---

#[test]
fn test_issue_then_verify_round_trip() {
    let creds = credentials();
    let id = Uuid::new_v4();
    let token = creds.issue_token(id).unwrap();

    assert_eq!(creds.verify_token(Some(&token)).unwrap(), id);
}

#[test]
fn test_absent_or_blank_token_is_unauthenticated() {
    let creds = credentials();
    assert!(matches!(creds.verify_token(None), Err(AppError::Unauthenticated)));
    assert!(matches!(
        creds.verify_token(Some("   ")),
        Err(AppError::Unauthenticated)
    ));
}

#[test]
fn test_expired_token_is_session_expired() {
    let creds = credentials();
    let issued = Utc::now() - Duration::minutes(TOKEN_TTL_MINUTES + 15);
    let token = creds.issue_token_at(Uuid::new_v4(), issued).unwrap();

    assert!(matches!(
        creds.verify_token(Some(&token)),
        Err(AppError::SessionExpired)
    ));
}

#[test]
fn test_token_still_valid_before_expiry() {
    let creds = credentials();
    let id = Uuid::new_v4();
    let issued = Utc::now() - Duration::minutes(TOKEN_TTL_MINUTES - 1);
    let token = creds.issue_token_at(id, issued).unwrap();

    assert_eq!(creds.verify_token(Some(&token)).unwrap(), id);
}

#[test]
fn test_malformed_token_is_session_expired() {
    assert!(matches!(
        credentials().verify_token(Some("not.a.jwt")),
        Err(AppError::SessionExpired)
    ));
}

#[test]
fn test_token_signed_with_other_secret_is_rejected() {
    let other = Credentials::new("a-completely-different-secret", TEST_COST);
    let token = other.issue_token(Uuid::new_v4()).unwrap();

    assert!(matches!(
        credentials().verify_token(Some(&token)),
        Err(AppError::SessionExpired)
    ));
}

#[test]
fn test_hand_built_claims_are_accepted() {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let claims = Claims {
        sub: id,
        iat: now.timestamp() as usize,
        exp: (now + Duration::minutes(5)).timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();

    assert_eq!(credentials().verify_token(Some(&token)).unwrap(), id);
}
