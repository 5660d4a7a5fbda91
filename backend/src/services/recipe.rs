//! Recipe service

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{NewRecipe, Recipe};
use crate::services::activity::{self, Activity};
use crate::services::consumable::lock_consumable;

/// Recipe service for grow recipes
#[derive(Clone)]
pub struct RecipeService {
    db: PgPool,
}

const RECIPE_COLUMNS: &str = "id, name, seed_consumable_id, seed_density_grams_per_tray, seed_soak_hours, \
     germination_days, blackout_days, light_days, expected_yield_grams, is_active, created_at, updated_at";

#[derive(Debug, FromRow)]
struct RecipeRow {
    id: Uuid,
    name: String,
    seed_consumable_id: Option<Uuid>,
    seed_density_grams_per_tray: Decimal,
    seed_soak_hours: i32,
    germination_days: Decimal,
    blackout_days: Decimal,
    light_days: Decimal,
    expected_yield_grams: Option<Decimal>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RecipeRow> for Recipe {
    fn from(row: RecipeRow) -> Self {
        Recipe {
            id: row.id,
            name: row.name,
            seed_consumable_id: row.seed_consumable_id,
            seed_density_grams_per_tray: row.seed_density_grams_per_tray,
            seed_soak_hours: row.seed_soak_hours,
            germination_days: row.germination_days,
            blackout_days: row.blackout_days,
            light_days: row.light_days,
            expected_yield_grams: row.expected_yield_grams,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Load a recipe on the caller's connection
pub(crate) async fn fetch_recipe(conn: &mut PgConnection, id: Uuid) -> AppResult<Recipe> {
    let row = sqlx::query_as::<_, RecipeRow>(&format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Recipe".to_string()))?;

    Ok(row.into())
}

/// Load several recipes at once, keyed by id
pub(crate) async fn fetch_recipes(
    conn: &mut PgConnection,
    ids: &[Uuid],
) -> AppResult<std::collections::HashMap<Uuid, Recipe>> {
    let rows = sqlx::query_as::<_, RecipeRow>(&format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ANY($1)"))
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows.into_iter().map(|row| (row.id, Recipe::from(row))).collect())
}

impl RecipeService {
    /// Create a new RecipeService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: NewRecipe) -> AppResult<Recipe> {
        let recipe = Recipe::create(input, Utc::now())?;

        let mut tx = self.db.begin().await?;
        if let Some(seed_id) = recipe.seed_consumable_id {
            let seed = lock_consumable(&mut *tx, seed_id).await.map_err(|e| match e {
                AppError::NotFound(_) => AppError::NotFound("Seed consumable".to_string()),
                other => other,
            })?;
            seed.ensure_recipe_seed()?;
        }

        sqlx::query(
            r#"
            INSERT INTO recipes (
                id, name, seed_consumable_id, seed_density_grams_per_tray, seed_soak_hours,
                germination_days, blackout_days, light_days, expected_yield_grams, is_active,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(recipe.id)
        .bind(&recipe.name)
        .bind(recipe.seed_consumable_id)
        .bind(recipe.seed_density_grams_per_tray)
        .bind(recipe.seed_soak_hours)
        .bind(recipe.germination_days)
        .bind(recipe.blackout_days)
        .bind(recipe.light_days)
        .bind(recipe.expected_yield_grams)
        .bind(recipe.is_active)
        .bind(recipe.created_at)
        .bind(recipe.updated_at)
        .execute(&mut *tx)
        .await?;
        activity::record(&mut *tx, Activity::new("crops", "recipe", recipe.id, "created").created(&recipe)?).await?;
        tx.commit().await?;

        tracing::info!(recipe_id = %recipe.id, name = %recipe.name, "recipe created");
        Ok(recipe)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Recipe> {
        let mut conn = self.db.acquire().await?;
        fetch_recipe(&mut conn, id).await
    }

    pub async fn list(&self, include_inactive: bool) -> AppResult<Vec<Recipe>> {
        let rows = sqlx::query_as::<_, RecipeRow>(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE is_active OR $1 ORDER BY name"
        ))
        .bind(include_inactive)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Recipe::from).collect())
    }

    /// Activate or retire a recipe; retired recipes cannot be planted
    pub async fn set_active(&self, id: Uuid, is_active: bool) -> AppResult<Recipe> {
        let mut tx = self.db.begin().await?;
        let before = fetch_recipe(&mut *tx, id).await?;
        let mut recipe = before.clone();
        recipe.is_active = is_active;
        recipe.updated_at = Utc::now();

        sqlx::query("UPDATE recipes SET is_active = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .bind(recipe.updated_at)
            .execute(&mut *tx)
            .await?;
        activity::record(
            &mut *tx,
            Activity::new("crops", "recipe", id, "updated").changes(&before, &recipe)?,
        )
        .await?;
        tx.commit().await?;

        Ok(recipe)
    }
}
