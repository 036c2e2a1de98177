use std::{
    path::{Path as FsPath, PathBuf},
    sync::LazyLock,
};

use axum::{
    Json,
    body::Bytes,
    extract::{
        Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::{HeaderName, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use regex::Regex;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    config::AppConfig,
    credentials::{ACCESS_TOKEN_COOKIE, Credentials, TOKEN_TTL_MINUTES},
    error::AppError,
    models::{
        AccountProfile, ApiResponse, DeletedRecipe, LoginRequest, LoginResponse, NewAccount,
        Recipe, RecipeFields, RegisterRequest, Role,
    },
    recipes::RecipeService,
    repository::RepositoryState,
    storage::file_extension,
};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,24})+$").expect("valid regex")
});

const USERNAME_MAX_CHARS: usize = 50;
// bcrypt only looks at the first 72 bytes.
const PASSWORD_MAX_BYTES: usize = 72;

/// Response header telling the caller whether a listing came from the read cache.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

// --- Accounts ---

/// register_user
///
/// [Public Route] Creates an account. The email is normalized to lower case and must be
/// unused; the password is hashed before anything is persisted.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = ApiResponse<AccountProfile>),
        (status = 400, description = "Missing fields or email already registered")
    )
)]
pub async fn register_user(
    State(repo): State<RepositoryState>,
    State(credentials): State<Credentials>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload.map_err(malformed_json)?;

    let (Some(username), Some(email), Some(password)) = (
        non_blank(payload.username),
        non_blank(payload.email),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::Validation(
            "Username, Email, Password are required".to_string(),
        ));
    };

    if username.chars().count() > USERNAME_MAX_CHARS {
        return Err(AppError::Validation(format!(
            "The username must be at most {USERNAME_MAX_CHARS} characters long."
        )));
    }
    let email = email.to_lowercase();
    if !EMAIL_PATTERN.is_match(&email) {
        return Err(AppError::Validation("Please enter a valid email".to_string()));
    }
    if password.len() > PASSWORD_MAX_BYTES {
        return Err(AppError::Validation(format!(
            "The password must be at most {PASSWORD_MAX_BYTES} bytes long."
        )));
    }

    if repo.find_account_by_email(&email).await?.is_some() {
        return Err(AppError::DuplicateAccount);
    }

    let password_hash = tokio::task::spawn_blocking(move || credentials.hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))??;

    let account = repo
        .create_account(NewAccount {
            username,
            email,
            password_hash,
            role: Role::User,
        })
        .await?;

    tracing::info!(account_id = %account.id, "account registered");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            vec![AccountProfile::from(&account)],
            "Thank you for registering with us. Your account has been created successfully.",
        )),
    ))
}

/// login
///
/// [Public Route] Verifies email and password and starts a 30-minute session. The token
/// is set as an HttpOnly, SameSite=Strict cookie and also returned in the body.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = ApiResponse<LoginResponse>),
        (status = 401, description = "Invalid email or password")
    )
)]
pub async fn login(
    State(repo): State<RepositoryState>,
    State(credentials): State<Credentials>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload.map_err(malformed_json)?;

    let (Some(email), Some(password)) = (
        non_blank(payload.email),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::Validation(
            "Email, Password are required".to_string(),
        ));
    };

    let account = repo
        .find_account_by_email(&email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let verifier = credentials.clone();
    let stored_hash = account.password_hash.clone();
    let valid = tokio::task::spawn_blocking(move || verifier.verify_password(&password, &stored_hash))
        .await
        .map_err(|e| AppError::Internal(format!("verification task failed: {e}")))?;
    if !valid {
        return Err(AppError::InvalidCredentials);
    }

    let token = credentials.issue_token(account.id)?;
    let cookie = Cookie::build((ACCESS_TOKEN_COOKIE, token.clone()))
        .http_only(true)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::minutes(TOKEN_TTL_MINUTES));

    tracing::info!(account_id = %account.id, "session started");

    Ok((
        jar.add(cookie),
        Json(ApiResponse::success(
            vec![LoginResponse {
                user: AccountProfile::from(&account),
                token,
            }],
            "You have successfully logged in.",
        )),
    ))
}

/// logout
///
/// [Public Route] Clears the session cookie. Tokens are stateless, so a copy held
/// elsewhere stays valid until it expires.
#[utoipa::path(
    get,
    path = "/api/v1/auth/logout",
    responses((status = 200, description = "Logged out"))
)]
pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let jar = jar.remove(Cookie::build(ACCESS_TOKEN_COOKIE).path("/"));
    (
        jar,
        Json(ApiResponse::<()>::success(
            Vec::new(),
            "You have been logged out successfully.",
        )),
    )
}

// --- Recipes ---

/// list_recipes
///
/// [Authenticated Route] The 8 most recent recipes, newest first. Cache hits and misses
/// share the same envelope; the `x-cache` header says which one it was.
#[utoipa::path(
    get,
    path = "/api/v1/recipes",
    responses(
        (status = 200, description = "Recent recipes", body = ApiResponse<Recipe>),
        (status = 404, description = "No recipes yet")
    )
)]
pub async fn list_recipes(
    _user: AuthUser,
    State(recipes): State<RecipeService>,
) -> Result<impl IntoResponse, AppError> {
    let listing = recipes.list().await?;
    Ok((
        [(HeaderName::from_static(CACHE_STATUS_HEADER), listing.cache.as_str())],
        Json(ApiResponse::success(listing.recipes, "Recipes fetched successfully.")),
    ))
}

/// create_recipe
///
/// [Authenticated Route] Multipart form with the recipe fields and one `image` file.
/// The owner is always the authenticated account.
#[utoipa::path(
    post,
    path = "/api/v1/recipes",
    request_body(content = RecipeFields, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Created", body = ApiResponse<Recipe>),
        (status = 400, description = "Missing fields, missing image, or upload failure")
    )
)]
pub async fn create_recipe(
    user: AuthUser,
    State(recipes): State<RecipeService>,
    State(config): State<AppConfig>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    let multipart = multipart.map_err(not_multipart)?;
    let form = read_recipe_form(multipart, &config.upload_dir).await?;
    let recipe = recipes.create(&user, form.fields, form.image).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            vec![recipe],
            "New Recipe created successfully.",
        )),
    ))
}

/// get_recipe
///
/// [Authenticated Route] A single recipe by id. A malformed id is a 400, an unknown one a 404.
#[utoipa::path(
    get,
    path = "/api/v1/recipes/{id}",
    params(("id" = String, Path, description = "Recipe ID")),
    responses(
        (status = 200, description = "Found", body = ApiResponse<Recipe>),
        (status = 400, description = "Malformed id"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_recipe(
    _user: AuthUser,
    State(recipes): State<RecipeService>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Recipe>>, AppError> {
    let recipe = recipes.get(&id).await?;
    Ok(Json(ApiResponse::success(
        vec![recipe],
        "Recipe fetched successfully.",
    )))
}

/// update_recipe
///
/// [Authenticated Route] Partial update from a multipart form; an `image` part replaces
/// the stored image.
///
/// *Authorization*: owner or admin only.
#[utoipa::path(
    put,
    path = "/api/v1/recipes/{id}",
    params(("id" = String, Path, description = "Recipe ID")),
    request_body(content = RecipeFields, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Updated", body = ApiResponse<Recipe>),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_recipe(
    user: AuthUser,
    State(recipes): State<RecipeService>,
    State(config): State<AppConfig>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ApiResponse<Recipe>>, AppError> {
    let multipart = multipart.map_err(not_multipart)?;
    let form = read_recipe_form(multipart, &config.upload_dir).await?;
    let recipe = recipes.update(&user, &id, form.fields, form.image).await?;

    Ok(Json(ApiResponse::success(
        vec![recipe],
        "Recipe has been updated successfully.",
    )))
}

/// delete_recipe
///
/// [Authenticated Route] Deletes a recipe and then its image.
///
/// *Authorization*: owner or admin only.
#[utoipa::path(
    delete,
    path = "/api/v1/recipes/{id}",
    params(("id" = String, Path, description = "Recipe ID")),
    responses(
        (status = 200, description = "Deleted", body = ApiResponse<DeletedRecipe>),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_recipe(
    user: AuthUser,
    State(recipes): State<RecipeService>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DeletedRecipe>>, AppError> {
    let ack = recipes.delete(&user, &id).await?;
    Ok(Json(ApiResponse::success(
        vec![ack],
        "Recipe has been deleted successfully.",
    )))
}

// --- Multipart parsing ---

/// RecipeForm
///
/// A parsed recipe form: the text fields plus the staged image file, if one was sent.
#[derive(Debug)]
pub struct RecipeForm {
    pub fields: RecipeFields,
    pub image: Option<PathBuf>,
}

/// read_recipe_form
///
/// Reads every part of the form. Text parts fill [`RecipeFields`]; the `image` part is
/// buffered and only written to `upload_dir` once the whole form parsed cleanly, so a
/// rejected form never leaves a file behind.
pub async fn read_recipe_form(
    mut multipart: Multipart,
    upload_dir: &FsPath,
) -> Result<RecipeForm, AppError> {
    let mut fields = RecipeFields::default();
    let mut image: Option<(String, Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(malformed_form)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "image" {
            let extension = field
                .file_name()
                .map(|n| file_extension(FsPath::new(n)))
                .unwrap_or_else(|| "bin".to_string());
            let bytes = field.bytes().await.map_err(malformed_form)?;
            if !bytes.is_empty() {
                image = Some((extension, bytes));
            }
            continue;
        }

        let value = field.text().await.map_err(malformed_form)?;
        apply_form_field(&mut fields, &name, value)?;
    }

    let image = match image {
        Some((extension, bytes)) => Some(stage_upload(upload_dir, &extension, &bytes).await?),
        None => None,
    };

    Ok(RecipeForm { fields, image })
}

/// apply_form_field
///
/// Sets one recipe field from its text form. List fields accept either repeated parts
/// or a single JSON array.
pub fn apply_form_field(
    fields: &mut RecipeFields,
    name: &str,
    value: String,
) -> Result<(), AppError> {
    match name {
        "title" => fields.title = Some(value),
        "description" => fields.description = Some(value),
        "totalTime" => fields.total_time = Some(parse_int(name, &value)?),
        "prepTime" => fields.prep_time = Some(parse_int(name, &value)?),
        "cookingTime" => fields.cooking_time = Some(parse_int(name, &value)?),
        "calories" => fields.calories = Some(parse_number(name, &value)?),
        "carbs" => fields.carbs = Some(parse_number(name, &value)?),
        "protein" => fields.protein = Some(parse_number(name, &value)?),
        "fat" => fields.fat = Some(parse_number(name, &value)?),
        "ingredients" => push_list(fields.ingredients.get_or_insert_with(Vec::new), name, value)?,
        "instructions" => {
            push_list(fields.instructions.get_or_insert_with(Vec::new), name, value)?
        }
        other => tracing::debug!(field = other, "ignoring unknown form field"),
    }
    Ok(())
}

fn push_list(list: &mut Vec<String>, name: &str, value: String) -> Result<(), AppError> {
    if value.trim_start().starts_with('[') {
        let items: Vec<String> = serde_json::from_str(&value).map_err(|_| {
            AppError::Validation(format!("{name} must be a JSON array of strings."))
        })?;
        list.extend(items);
    } else {
        list.push(value);
    }
    Ok(())
}

fn parse_int(name: &str, value: &str) -> Result<i32, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("{name} must be a whole number.")))
}

fn parse_number(name: &str, value: &str) -> Result<f64, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("{name} must be a number.")))
}

async fn stage_upload(dir: &FsPath, extension: &str, bytes: &[u8]) -> Result<PathBuf, AppError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::Internal(format!("cannot create upload dir: {e}")))?;

    let path = dir.join(format!("{}.{}", Uuid::new_v4(), extension));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| AppError::Internal(format!("cannot stage upload: {e}")))?;
    Ok(path)
}

fn malformed_json(err: JsonRejection) -> AppError {
    tracing::debug!(error = %err.body_text(), "rejected request body");
    AppError::Validation(
        "The request body must be a JSON object. Please check it and try again.".to_string(),
    )
}

fn not_multipart(err: MultipartRejection) -> AppError {
    tracing::debug!(error = %err.body_text(), "rejected recipe form");
    AppError::Validation("Please send the recipe as multipart/form-data.".to_string())
}

fn malformed_form(err: MultipartError) -> AppError {
    tracing::debug!(error = %err.body_text(), "could not read recipe form");
    AppError::Validation(
        "The form data could not be read. Please check it and try again.".to_string(),
    )
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
