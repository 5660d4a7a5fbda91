//! HTTP handlers for recipe endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{NewRecipe, Recipe};
use crate::services::RecipeService;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RecipeQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize)]
pub struct RecipeActiveInput {
    pub is_active: bool,
}

pub async fn create_recipe(
    State(state): State<AppState>,
    Json(input): Json<NewRecipe>,
) -> AppResult<Json<Recipe>> {
    let service = RecipeService::new(state.db);
    let recipe = service.create(input).await?;
    Ok(Json(recipe))
}

pub async fn list_recipes(
    State(state): State<AppState>,
    Query(query): Query<RecipeQuery>,
) -> AppResult<Json<Vec<Recipe>>> {
    let service = RecipeService::new(state.db);
    let recipes = service.list(query.include_inactive).await?;
    Ok(Json(recipes))
}

pub async fn get_recipe(State(state): State<AppState>, Path(recipe_id): Path<Uuid>) -> AppResult<Json<Recipe>> {
    let service = RecipeService::new(state.db);
    let recipe = service.get(recipe_id).await?;
    Ok(Json(recipe))
}

/// Activate or retire a recipe
pub async fn set_recipe_active(
    State(state): State<AppState>,
    Path(recipe_id): Path<Uuid>,
    Json(input): Json<RecipeActiveInput>,
) -> AppResult<Json<Recipe>> {
    let service = RecipeService::new(state.db);
    let recipe = service.set_active(recipe_id, input.is_active).await?;
    Ok(Json(recipe))
}
