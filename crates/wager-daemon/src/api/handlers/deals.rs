//! Deal listing handlers. Every call identifies the caller by the
//! chat-surface external id, resolved to an internal `UserId` here.

use crate::api::state::AppState;
use crate::error::ApiResult;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use wager_types::{Deal, FightId};

#[derive(Debug, Deserialize)]
pub struct OpenDealsQuery {
    pub excluding_external_id: String,
}

pub async fn list_open_deals(
    State(state): State<AppState>,
    Path(fight_id): Path<i64>,
    Query(query): Query<OpenDealsQuery>,
) -> ApiResult<Json<Vec<Deal>>> {
    let excluding_user = state.matchmaking.resolve_user(&query.excluding_external_id, None).await?;
    let deals = state
        .matchmaking
        .list_open_deals(FightId::new(fight_id), excluding_user)
        .await?;
    Ok(Json(deals))
}

pub async fn list_my_active_deals(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> ApiResult<Json<Vec<Deal>>> {
    let user = state.matchmaking.resolve_user(&external_id, None).await?;
    Ok(Json(state.matchmaking.list_my_active_deals(user).await?))
}

pub async fn list_my_shareable_deals(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> ApiResult<Json<Vec<Deal>>> {
    let user = state.matchmaking.resolve_user(&external_id, None).await?;
    Ok(Json(state.matchmaking.list_my_shareable_deals(user).await?))
}
