//! Recipe lifecycle: create, list, get, update, and delete, keeping the record store,
//! the asset store, and the listing cache consistent with each other.
//!
//! Per recipe id the states are `NonExistent -> Active -> (Updated)* -> Deleted`.
//! Every transition except creation passes the ownership check in [`crate::auth`].
//!
//! Calls to collaborators are strictly sequenced: an image is uploaded before the
//! record that references it is written, and a record is deleted before its image.
//! Asset cleanup after a record mutation is best-effort and never rolled back against.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use axum::extract::FromRef;
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthUser, authorize},
    cache::CacheState,
    error::AppError,
    models::{DeletedRecipe, NewRecipe, Recipe, RecipeFields, RecipeImage, RecipePatch},
    repository::RepositoryState,
    storage::AssetState,
};

/// Cache key of the serialized recent-recipes listing.
pub const LISTING_CACHE_KEY: &str = "recipes:recent";

/// Number of recipes returned by the listing.
pub const LISTING_LIMIT: i64 = 8;

/// Maximum title length, in characters.
pub const TITLE_MAX_CHARS: usize = 50;

/// Length of a recipe id in its canonical hyphenated form.
pub const RECIPE_ID_LEN: usize = 36;

/// Where a listing was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
        }
    }
}

/// Listing
///
/// The recent recipes plus whether they came from the read cache.
#[derive(Debug, Clone)]
pub struct Listing {
    pub recipes: Vec<Recipe>,
    pub cache: CacheStatus,
}

/// RecipeService
///
/// The recipe lifecycle manager. Its collaborators are injected at construction, so
/// tests run it against the in-memory repository, mock asset store, and memory cache.
#[derive(Clone)]
pub struct RecipeService {
    repo: RepositoryState,
    assets: AssetState,
    cache: CacheState,
    listing_ttl: Duration,
}

impl FromRef<AppState> for RecipeService {
    fn from_ref(state: &AppState) -> RecipeService {
        RecipeService::new(
            state.repo.clone(),
            state.assets.clone(),
            state.cache.clone(),
            state.config.cache_ttl,
        )
    }
}

impl RecipeService {
    pub fn new(
        repo: RepositoryState,
        assets: AssetState,
        cache: CacheState,
        listing_ttl: Duration,
    ) -> Self {
        Self {
            repo,
            assets,
            cache,
            listing_ttl,
        }
    }

    /// create
    ///
    /// Validates the fields, uploads the image, then persists the recipe owned by
    /// `identity`. A failed upload aborts before anything is written. The local image
    /// file is removed once this call returns, whatever the outcome.
    pub async fn create(
        &self,
        identity: &AuthUser,
        fields: RecipeFields,
        image_path: Option<PathBuf>,
    ) -> Result<Recipe, AppError> {
        let result = self.create_inner(identity, fields, image_path.as_deref()).await;
        if let Some(path) = &image_path {
            remove_local_file(path).await;
        }
        result
    }

    async fn create_inner(
        &self,
        identity: &AuthUser,
        fields: RecipeFields,
        image_path: Option<&Path>,
    ) -> Result<Recipe, AppError> {
        let draft = validate_new(fields)?;
        let image_path = match image_path {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => {
                return Err(AppError::Validation(
                    "A recipe image is required. Please attach one in the 'image' field."
                        .to_string(),
                ));
            }
        };

        let image = self.upload(image_path).await?;
        let public_id = image.public_id.clone();

        let created = match self.repo.create_recipe(draft.with_owner(identity.id, image)).await {
            Ok(recipe) => recipe,
            Err(e) => {
                self.discard_asset(&public_id).await;
                return Err(e.into());
            }
        };

        tracing::info!(recipe_id = %created.id, owner = %identity.id, "recipe created");
        self.invalidate_listing().await;
        Ok(created)
    }

    /// list
    ///
    /// The most recent recipes, newest first. Served from the read cache while the
    /// cached listing is fresh; otherwise read from the record store and cached.
    pub async fn list(&self) -> Result<Listing, AppError> {
        match self.cache.get(LISTING_CACHE_KEY).await {
            Ok(Some(body)) => match serde_json::from_str::<Vec<Recipe>>(&body) {
                Ok(recipes) => {
                    return Ok(Listing {
                        recipes,
                        cache: CacheStatus::Hit,
                    });
                }
                Err(e) => tracing::warn!(error = %e, "discarding unreadable cached listing"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "read cache lookup failed, falling back to store"),
        }

        let recipes = self.repo.recent_recipes(LISTING_LIMIT).await?;
        if recipes.is_empty() {
            return Err(AppError::NotFound(
                "Recipes not found! Try creating a new recipe.".to_string(),
            ));
        }

        match serde_json::to_string(&recipes) {
            Ok(body) => {
                if let Err(e) = self
                    .cache
                    .set_with_ttl(LISTING_CACHE_KEY, body, self.listing_ttl)
                    .await
                {
                    tracing::warn!(error = %e, "failed to populate listing cache");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize listing for cache"),
        }

        Ok(Listing {
            recipes,
            cache: CacheStatus::Miss,
        })
    }

    /// get
    ///
    /// A malformed id is a validation error, checked before the store is queried.
    pub async fn get(&self, id: &str) -> Result<Recipe, AppError> {
        let id = parse_recipe_id(id)?;
        self.find(id).await
    }

    /// update
    ///
    /// Applies the supplied fields to a recipe owned by `identity` (or any recipe, for
    /// an admin). With a new image, the new one is uploaded first and the record is
    /// written; only once the write succeeds is the previous object deleted, best-effort.
    /// If the write fails, the new object is deleted and the record keeps its old image.
    pub async fn update(
        &self,
        identity: &AuthUser,
        id: &str,
        fields: RecipeFields,
        image_path: Option<PathBuf>,
    ) -> Result<Recipe, AppError> {
        let result = self.update_inner(identity, id, fields, image_path.as_deref()).await;
        if let Some(path) = &image_path {
            remove_local_file(path).await;
        }
        result
    }

    async fn update_inner(
        &self,
        identity: &AuthUser,
        id: &str,
        fields: RecipeFields,
        image_path: Option<&Path>,
    ) -> Result<Recipe, AppError> {
        let id = parse_recipe_id(id)?;
        let existing = self.find(id).await?;
        authorize(identity, existing.owner, "You can only update your own recipe.")?;

        let mut patch = validate_patch(fields)?;

        if let Some(path) = image_path.filter(|p| !p.as_os_str().is_empty()) {
            patch.image = Some(self.upload(path).await?);
        }

        let new_public_id = patch.image.as_ref().map(|i| i.public_id.clone());
        match self.repo.update_recipe(id, patch).await {
            Ok(Some(updated)) => {
                tracing::info!(recipe_id = %id, by = %identity.id, "recipe updated");
                // The record no longer references the previous image.
                if let (Some(_), Some(previous)) = (&new_public_id, &existing.image) {
                    self.discard_asset(&previous.public_id).await;
                }
                self.invalidate_listing().await;
                Ok(updated)
            }
            Ok(None) => {
                if let Some(public_id) = &new_public_id {
                    self.discard_asset(public_id).await;
                }
                Err(not_found(id))
            }
            Err(e) => {
                if let Some(public_id) = &new_public_id {
                    self.discard_asset(public_id).await;
                }
                Err(e.into())
            }
        }
    }

    /// delete
    ///
    /// Removes the record first, then its image best-effort.
    pub async fn delete(&self, identity: &AuthUser, id: &str) -> Result<DeletedRecipe, AppError> {
        let id = parse_recipe_id(id)?;
        let existing = self.find(id).await?;
        authorize(identity, existing.owner, "You can only delete your own recipe.")?;

        if !self.repo.delete_recipe(id).await? {
            return Err(not_found(id));
        }
        tracing::info!(recipe_id = %id, by = %identity.id, "recipe deleted");

        if let Some(image) = &existing.image {
            self.discard_asset(&image.public_id).await;
        }
        self.invalidate_listing().await;

        Ok(DeletedRecipe {
            id,
            deleted_count: 1,
        })
    }

    async fn find(&self, id: Uuid) -> Result<Recipe, AppError> {
        self.repo
            .get_recipe(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    async fn upload(&self, path: &Path) -> Result<RecipeImage, AppError> {
        self.assets.upload(path).await.map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "image upload failed");
            AppError::AssetUpload
        })
    }

    async fn discard_asset(&self, public_id: &str) {
        if let Err(e) = self.assets.delete(public_id).await {
            tracing::warn!(public_id, error = %e, "could not delete image from asset store");
        }
    }

    async fn invalidate_listing(&self) {
        if let Err(e) = self.cache.invalidate(LISTING_CACHE_KEY).await {
            tracing::warn!(error = %e, "could not invalidate listing cache");
        }
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Recipe with id {id} was not found."))
}

async fn remove_local_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "could not remove temporary upload");
        }
    }
}

/// parse_recipe_id
///
/// Recipe ids are UUIDs in their 36-character hyphenated form; anything else is
/// rejected as a validation error rather than looked up.
pub fn parse_recipe_id(raw: &str) -> Result<Uuid, AppError> {
    let invalid = || AppError::Validation("Please search recipe with a valid recipe id.".to_string());
    if raw.len() != RECIPE_ID_LEN {
        return Err(invalid());
    }
    Uuid::try_parse(raw).map_err(|_| invalid())
}

// --- Validation ---

/// A fully validated create payload, still missing its owner and image.
struct RecipeDraft {
    title: String,
    description: String,
    total_time: i32,
    prep_time: i32,
    cooking_time: i32,
    calories: f64,
    carbs: f64,
    protein: f64,
    fat: f64,
    ingredients: Vec<String>,
    instructions: Vec<String>,
}

impl RecipeDraft {
    fn with_owner(self, owner: Uuid, image: RecipeImage) -> NewRecipe {
        NewRecipe {
            owner,
            title: self.title,
            description: self.description,
            total_time: self.total_time,
            prep_time: self.prep_time,
            cooking_time: self.cooking_time,
            calories: self.calories,
            carbs: self.carbs,
            protein: self.protein,
            fat: self.fat,
            ingredients: self.ingredients,
            instructions: self.instructions,
            image,
        }
    }
}

/// Names of the required fields absent from `fields`, in wire format.
pub fn missing_required_fields(fields: &RecipeFields) -> Vec<&'static str> {
    let checks = [
        ("title", fields.title.is_none()),
        ("description", fields.description.is_none()),
        ("totalTime", fields.total_time.is_none()),
        ("prepTime", fields.prep_time.is_none()),
        ("cookingTime", fields.cooking_time.is_none()),
        ("ingredients", fields.ingredients.is_none()),
        ("instructions", fields.instructions.is_none()),
        ("calories", fields.calories.is_none()),
        ("carbs", fields.carbs.is_none()),
        ("protein", fields.protein.is_none()),
        ("fat", fields.fat.is_none()),
    ];
    checks
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect()
}

fn validate_new(fields: RecipeFields) -> Result<RecipeDraft, AppError> {
    let missing = missing_required_fields(&fields);
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "Missing required fields: {}.",
            missing.join(", ")
        )));
    }

    let patch = validate_patch(fields)?;
    match patch {
        RecipePatch {
            title: Some(title),
            description: Some(description),
            total_time: Some(total_time),
            prep_time: Some(prep_time),
            cooking_time: Some(cooking_time),
            calories: Some(calories),
            carbs: Some(carbs),
            protein: Some(protein),
            fat: Some(fat),
            ingredients: Some(ingredients),
            instructions: Some(instructions),
            ..
        } => Ok(RecipeDraft {
            title,
            description,
            total_time,
            prep_time,
            cooking_time,
            calories,
            carbs,
            protein,
            fat,
            ingredients,
            instructions,
        }),
        _ => Err(AppError::Validation("Missing required recipe fields.".to_string())),
    }
}

/// Validates whichever fields are present and trims the text ones.
fn validate_patch(fields: RecipeFields) -> Result<RecipePatch, AppError> {
    let title = fields
        .title
        .map(|t| required_text("title", t))
        .transpose()?;
    if let Some(title) = &title {
        if title.chars().count() > TITLE_MAX_CHARS {
            return Err(AppError::Validation(format!(
                "The title must be at most {TITLE_MAX_CHARS} characters long."
            )));
        }
    }

    Ok(RecipePatch {
        title,
        description: fields
            .description
            .map(|d| required_text("description", d))
            .transpose()?,
        total_time: non_negative_int("totalTime", fields.total_time)?,
        prep_time: non_negative_int("prepTime", fields.prep_time)?,
        cooking_time: non_negative_int("cookingTime", fields.cooking_time)?,
        calories: non_negative_number("calories", fields.calories)?,
        carbs: non_negative_number("carbs", fields.carbs)?,
        protein: non_negative_number("protein", fields.protein)?,
        fat: non_negative_number("fat", fields.fat)?,
        ingredients: fields.ingredients.map(clean_steps),
        instructions: fields.instructions.map(clean_steps),
        image: None,
    })
}

fn required_text(name: &str, value: String) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("The {name} must not be empty.")));
    }
    Ok(trimmed.to_string())
}

fn non_negative_int(name: &str, value: Option<i32>) -> Result<Option<i32>, AppError> {
    match value {
        Some(v) if v < 0 => Err(AppError::Validation(format!(
            "{name} must be zero or greater."
        ))),
        other => Ok(other),
    }
}

fn non_negative_number(name: &str, value: Option<f64>) -> Result<Option<f64>, AppError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(AppError::Validation(format!(
            "{name} must be a number, zero or greater."
        ))),
        other => Ok(other),
    }
}

/// Trims each entry and drops blank ones, keeping order.
fn clean_steps(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
