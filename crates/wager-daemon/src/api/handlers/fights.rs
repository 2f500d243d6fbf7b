//! Fight catalog read handlers.

use crate::api::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::extract::{Path, State};
use axum::Json;
use wager_types::{Fight, FightId};

pub async fn list_upcoming_fights(State(state): State<AppState>) -> ApiResult<Json<Vec<Fight>>> {
    Ok(Json(state.matchmaking.list_upcoming_fights().await?))
}

pub async fn get_fight(State(state): State<AppState>, Path(fight_id): Path<i64>) -> ApiResult<Json<Fight>> {
    let fight = state
        .matchmaking
        .get_fight(FightId::new(fight_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("fight {fight_id} not found")))?;
    Ok(Json(fight))
}
