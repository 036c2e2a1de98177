use std::fmt;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Accounts ---

/// Role
///
/// The RBAC field of an account. Admins may mutate any recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// PasswordHash
///
/// A bcrypt hash. Only produced by `Credentials::hash_password` or loaded from the record
/// store, so a stored value is never hashed a second time. Never serialized.
#[derive(Clone, PartialEq, Eq, sqlx::Type)]
#[sqlx(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub(crate) fn from_hashed(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

/// Account
///
/// A registered user as stored in the `accounts` table. The email is stored lower-cased,
/// which is what makes uniqueness case-insensitive.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: PasswordHash,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// NewAccount
///
/// Insert payload for registration. Carries an already-computed hash.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: PasswordHash,
    pub role: Role,
}

/// AccountProfile
///
/// The client-facing view of an account: no password hash, no role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AccountProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl From<&Account> for AccountProfile {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

/// RegisterRequest
///
/// Input payload for POST /auth/register. Fields are optional so that a missing field
/// becomes a validation message instead of a deserialization rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// LoginRequest
///
/// Input payload for POST /auth/login.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// LoginResponse
///
/// Returned by a successful login. The token is also set as the `access_token` cookie.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub user: AccountProfile,
    pub token: String,
}

// --- Recipes ---

/// RecipeImage
///
/// Reference to the recipe photo held by the asset store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RecipeImage {
    /// Opaque identifier used to delete the object from the asset store.
    pub public_id: String,
    pub image_url: String,
}

/// Recipe
///
/// The client-facing recipe. Every recipe has exactly one owner (`user`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Recipe {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub total_time: i32,
    pub prep_time: i32,
    pub cooking_time: i32,
    pub calories: f64,
    pub carbs: f64,
    pub protein: f64,
    pub fat: f64,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub image: Option<RecipeImage>,
    /// Owning account.
    #[serde(rename = "user")]
    pub owner: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// RecipeRow
///
/// Raw database row for the `recipes` table. Carries the internal `version` counter,
/// which is dropped when converting into [`Recipe`].
#[derive(Debug, Clone, FromRow)]
pub struct RecipeRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub total_time: i32,
    pub prep_time: i32,
    pub cooking_time: i32,
    pub calories: f64,
    pub carbs: f64,
    pub protein: f64,
    pub fat: f64,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub image_public_id: Option<String>,
    pub image_url: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RecipeRow> for Recipe {
    fn from(row: RecipeRow) -> Self {
        let image = match (row.image_public_id, row.image_url) {
            (Some(public_id), Some(image_url)) => Some(RecipeImage {
                public_id,
                image_url,
            }),
            _ => None,
        };

        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            total_time: row.total_time,
            prep_time: row.prep_time,
            cooking_time: row.cooking_time,
            calories: row.calories,
            carbs: row.carbs,
            protein: row.protein,
            fat: row.fat,
            ingredients: row.ingredients,
            instructions: row.instructions,
            image,
            owner: row.user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// RecipeFields
///
/// The recipe attributes supplied by a create or update request. Everything is optional
/// here; the lifecycle manager decides which fields are required for each operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RecipeFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_time: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prep_time: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooking_time: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingredients: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protein: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fat: Option<f64>,
}

/// NewRecipe
///
/// Validated insert payload. Only built once the image is already in the asset store.
#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub owner: Uuid,
    pub title: String,
    pub description: String,
    pub total_time: i32,
    pub prep_time: i32,
    pub cooking_time: i32,
    pub calories: f64,
    pub carbs: f64,
    pub protein: f64,
    pub fat: f64,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub image: RecipeImage,
}

/// RecipePatch
///
/// Partial update. `None` keeps the stored value, including the image reference.
#[derive(Debug, Clone, Default)]
pub struct RecipePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub total_time: Option<i32>,
    pub prep_time: Option<i32>,
    pub cooking_time: Option<i32>,
    pub calories: Option<f64>,
    pub carbs: Option<f64>,
    pub protein: Option<f64>,
    pub fat: Option<f64>,
    pub ingredients: Option<Vec<String>>,
    pub instructions: Option<Vec<String>>,
    pub image: Option<RecipeImage>,
}

/// DeletedRecipe
///
/// Acknowledgment returned by DELETE /recipes/{id}.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DeletedRecipe {
    pub id: Uuid,
    pub deleted_count: u32,
}

// --- Envelope ---

/// ApiResponse
///
/// The envelope shared by every JSON response, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub status: bool,
    pub data: Vec<T>,
    pub message: String,
    /// HTTP status code, present on failures only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<u16>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: Vec<T>, message: impl Into<String>) -> Self {
        Self {
            status: true,
            data,
            message: message.into(),
            error: None,
        }
    }

    pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: false,
            data: Vec::new(),
            message: message.into(),
            error: Some(status.as_u16()),
        }
    }
}
