use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::RepositoryError,
    models::{Account, NewAccount, NewRecipe, Recipe, RecipePatch, RecipeRow},
};

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Repository Trait
///
/// The Record Store contract. Handlers and the recipe lifecycle manager only see this
/// trait, so the Postgres implementation can be swapped for the in-memory one in tests.
///
/// Individual writes are atomic; no locking is layered on top.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Accounts ---
    /// Looks an account up by email. Matching is case-insensitive.
    async fn find_account_by_email(&self, email: &str) -> RepoResult<Option<Account>>;
    async fn get_account(&self, id: Uuid) -> RepoResult<Option<Account>>;
    /// Fails with `RepositoryError::Conflict` if the email is already registered.
    async fn create_account(&self, account: NewAccount) -> RepoResult<Account>;

    // --- Recipes ---
    async fn get_recipe(&self, id: Uuid) -> RepoResult<Option<Recipe>>;
    /// The `limit` most recently created recipes, newest first.
    async fn recent_recipes(&self, limit: i64) -> RepoResult<Vec<Recipe>>;
    async fn create_recipe(&self, recipe: NewRecipe) -> RepoResult<Recipe>;
    /// Applies the supplied fields. Returns `None` if the recipe does not exist.
    async fn update_recipe(&self, id: Uuid, patch: RecipePatch) -> RepoResult<Option<Recipe>>;
    /// Returns true if a row was removed.
    async fn delete_recipe(&self, id: Uuid) -> RepoResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const ACCOUNT_COLUMNS: &str = "id, username, email, password_hash, role, created_at, updated_at";

const RECIPE_COLUMNS: &str = r#"
    id, user_id, title, description, total_time, prep_time, cooking_time,
    calories, carbs, protein, fat, ingredients, instructions,
    image_public_id, image_url, version, created_at, updated_at
"#;

/// PostgresRepository
///
/// The Record Store backed by PostgreSQL. Schema lives in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_account_by_email(&self, email: &str) -> RepoResult<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = lower($1)");
        let account = sqlx::query_as::<_, Account>(&query)
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn get_account(&self, id: Uuid) -> RepoResult<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let account = sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    /// create_account
    ///
    /// The unique index on `email` enforces one account per address; a violation comes
    /// back as `RepositoryError::Conflict` through the `From<sqlx::Error>` mapping.
    async fn create_account(&self, account: NewAccount) -> RepoResult<Account> {
        let query = format!(
            "INSERT INTO accounts (id, username, email, password_hash, role, created_at, updated_at) \
             VALUES ($1, $2, lower($3), $4, $5, NOW(), NOW()) \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Account>(&query)
            .bind(Uuid::new_v4())
            .bind(account.username)
            .bind(account.email.trim())
            .bind(account.password_hash)
            .bind(account.role.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn get_recipe(&self, id: Uuid) -> RepoResult<Option<Recipe>> {
        let query = format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $1");
        let row = sqlx::query_as::<_, RecipeRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Recipe::from))
    }

    async fn recent_recipes(&self, limit: i64) -> RepoResult<Vec<Recipe>> {
        let query =
            format!("SELECT {RECIPE_COLUMNS} FROM recipes ORDER BY created_at DESC LIMIT $1");
        let rows = sqlx::query_as::<_, RecipeRow>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Recipe::from).collect())
    }

    async fn create_recipe(&self, recipe: NewRecipe) -> RepoResult<Recipe> {
        let query = format!(
            r#"
            INSERT INTO recipes (
                id, user_id, title, description, total_time, prep_time, cooking_time,
                calories, carbs, protein, fat, ingredients, instructions,
                image_public_id, image_url, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, 0, NOW(), NOW())
            RETURNING {RECIPE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, RecipeRow>(&query)
            .bind(Uuid::new_v4())
            .bind(recipe.owner)
            .bind(recipe.title)
            .bind(recipe.description)
            .bind(recipe.total_time)
            .bind(recipe.prep_time)
            .bind(recipe.cooking_time)
            .bind(recipe.calories)
            .bind(recipe.carbs)
            .bind(recipe.protein)
            .bind(recipe.fat)
            .bind(recipe.ingredients)
            .bind(recipe.instructions)
            .bind(recipe.image.public_id)
            .bind(recipe.image.image_url)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    /// update_recipe
    ///
    /// Uses `COALESCE` so that only the fields present in the patch are written. Every
    /// update bumps the internal `version` counter.
    async fn update_recipe(&self, id: Uuid, patch: RecipePatch) -> RepoResult<Option<Recipe>> {
        let (image_public_id, image_url) = match patch.image {
            Some(image) => (Some(image.public_id), Some(image.image_url)),
            None => (None, None),
        };

        let query = format!(
            r#"
            UPDATE recipes
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                total_time = COALESCE($4, total_time),
                prep_time = COALESCE($5, prep_time),
                cooking_time = COALESCE($6, cooking_time),
                calories = COALESCE($7, calories),
                carbs = COALESCE($8, carbs),
                protein = COALESCE($9, protein),
                fat = COALESCE($10, fat),
                ingredients = COALESCE($11, ingredients),
                instructions = COALESCE($12, instructions),
                image_public_id = COALESCE($13, image_public_id),
                image_url = COALESCE($14, image_url),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {RECIPE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, RecipeRow>(&query)
            .bind(id)
            .bind(patch.title)
            .bind(patch.description)
            .bind(patch.total_time)
            .bind(patch.prep_time)
            .bind(patch.cooking_time)
            .bind(patch.calories)
            .bind(patch.carbs)
            .bind(patch.protein)
            .bind(patch.fat)
            .bind(patch.ingredients)
            .bind(patch.instructions)
            .bind(image_public_id)
            .bind(image_url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Recipe::from))
    }

    async fn delete_recipe(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// MemoryRepository
///
/// An in-process Record Store with the same observable semantics as the Postgres one.
/// Used by the test suites and handy for running the service without a database.
#[derive(Default)]
pub struct MemoryRepository {
    accounts: RwLock<HashMap<Uuid, Account>>,
    // Insertion order is kept so that equal timestamps still sort newest-first.
    recipes: RwLock<Vec<RecipeRow>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored recipes.
    pub async fn recipe_count(&self) -> usize {
        self.recipes.read().await.len()
    }

    /// Overrides an account's role. There is no HTTP surface for promoting admins.
    pub async fn set_role(&self, id: Uuid, role: crate::models::Role) -> bool {
        match self.accounts.write().await.get_mut(&id) {
            Some(account) => {
                account.role = role;
                account.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Removes an account, leaving its recipes in place.
    pub async fn remove_account(&self, id: Uuid) -> bool {
        self.accounts.write().await.remove(&id).is_some()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_account_by_email(&self, email: &str) -> RepoResult<Option<Account>> {
        let needle = email.trim().to_lowercase();
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| a.email == needle).cloned())
    }

    async fn get_account(&self, id: Uuid) -> RepoResult<Option<Account>> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn create_account(&self, account: NewAccount) -> RepoResult<Account> {
        let email = account.email.trim().to_lowercase();
        let mut accounts = self.accounts.write().await;
        if accounts.values().any(|a| a.email == email) {
            return Err(RepositoryError::Conflict(format!("email {email} already exists")));
        }

        let now = Utc::now();
        let created = Account {
            id: Uuid::new_v4(),
            username: account.username,
            email,
            password_hash: account.password_hash,
            role: account.role,
            created_at: now,
            updated_at: now,
        };
        accounts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_recipe(&self, id: Uuid) -> RepoResult<Option<Recipe>> {
        let recipes = self.recipes.read().await;
        Ok(recipes.iter().find(|r| r.id == id).cloned().map(Recipe::from))
    }

    async fn recent_recipes(&self, limit: i64) -> RepoResult<Vec<Recipe>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let recipes = self.recipes.read().await;
        let mut newest_first: Vec<&RecipeRow> = recipes.iter().rev().collect();
        // Stable sort: ties keep the reversed insertion order.
        newest_first.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(newest_first
            .into_iter()
            .take(limit)
            .cloned()
            .map(Recipe::from)
            .collect())
    }

    async fn create_recipe(&self, recipe: NewRecipe) -> RepoResult<Recipe> {
        let now = Utc::now();
        let row = RecipeRow {
            id: Uuid::new_v4(),
            user_id: recipe.owner,
            title: recipe.title,
            description: recipe.description,
            total_time: recipe.total_time,
            prep_time: recipe.prep_time,
            cooking_time: recipe.cooking_time,
            calories: recipe.calories,
            carbs: recipe.carbs,
            protein: recipe.protein,
            fat: recipe.fat,
            ingredients: recipe.ingredients,
            instructions: recipe.instructions,
            image_public_id: Some(recipe.image.public_id),
            image_url: Some(recipe.image.image_url),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.recipes.write().await.push(row.clone());
        Ok(row.into())
    }

    async fn update_recipe(&self, id: Uuid, patch: RecipePatch) -> RepoResult<Option<Recipe>> {
        let mut recipes = self.recipes.write().await;
        let Some(row) = recipes.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };

        if let Some(title) = patch.title {
            row.title = title;
        }
        if let Some(description) = patch.description {
            row.description = description;
        }
        if let Some(v) = patch.total_time {
            row.total_time = v;
        }
        if let Some(v) = patch.prep_time {
            row.prep_time = v;
        }
        if let Some(v) = patch.cooking_time {
            row.cooking_time = v;
        }
        if let Some(v) = patch.calories {
            row.calories = v;
        }
        if let Some(v) = patch.carbs {
            row.carbs = v;
        }
        if let Some(v) = patch.protein {
            row.protein = v;
        }
        if let Some(v) = patch.fat {
            row.fat = v;
        }
        if let Some(ingredients) = patch.ingredients {
            row.ingredients = ingredients;
        }
        if let Some(instructions) = patch.instructions {
            row.instructions = instructions;
        }
        if let Some(image) = patch.image {
            row.image_public_id = Some(image.public_id);
            row.image_url = Some(image.image_url);
        }
        row.version += 1;
        row.updated_at = Utc::now();

        Ok(Some(row.clone().into()))
    }

    async fn delete_recipe(&self, id: Uuid) -> RepoResult<bool> {
        let mut recipes = self.recipes.write().await;
        let before = recipes.len();
        recipes.retain(|r| r.id != id);
        Ok(recipes.len() < before)
    }
}
