//! Invoice-creating handlers: opening a new wager and responding to an
//! existing one.

use crate::api::state::AppState;
use crate::error::ApiResult;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use wager_engine::Reconciler;
use wager_types::{Cents, DealId, FightId, Side};

const FAST_POLL_ATTEMPTS: u32 = 15;
const FAST_POLL_DELAY: Duration = Duration::from_secs(2);

/// Fire-and-forget: gives a payer who pays within a few seconds of
/// creating the invoice a matched/awaiting deal without waiting for the
/// next slow reconciliation tick. Failures are logged, never surfaced —
/// the slow loop remains the source of truth either way.
fn spawn_fast_poll(reconciler: Arc<Reconciler>, invoice_id: i64) {
    tokio::spawn(async move {
        if let Err(e) = reconciler.poll_until_settled(invoice_id, FAST_POLL_ATTEMPTS, FAST_POLL_DELAY).await {
            tracing::warn!(invoice_id, error = %e, "fast-path invoice poll failed");
        }
    });
}

#[derive(Debug, Deserialize)]
pub struct CreateNewIntentRequest {
    pub side: Side,
    pub amount_cents: i64,
    pub payer_external_id: String,
    pub payer_username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMatchIntentRequest {
    pub payer_external_id: String,
    pub payer_username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedIntentResponse {
    pub invoice_id: i64,
    pub pay_url: String,
}

pub async fn create_new_intent(
    State(state): State<AppState>,
    Path(fight_id): Path<i64>,
    Json(request): Json<CreateNewIntentRequest>,
) -> ApiResult<Json<CreatedIntentResponse>> {
    let created = state
        .matchmaking
        .create_new_intent(
            FightId::new(fight_id),
            request.side,
            Cents(request.amount_cents),
            &request.payer_external_id,
            request.payer_username.as_deref(),
        )
        .await?;
    spawn_fast_poll(state.reconciler.clone(), created.invoice_id);
    Ok(Json(CreatedIntentResponse {
        invoice_id: created.invoice_id,
        pay_url: created.pay_url,
    }))
}

pub async fn create_match_intent(
    State(state): State<AppState>,
    Path(deal_id): Path<i64>,
    Json(request): Json<CreateMatchIntentRequest>,
) -> ApiResult<Json<CreatedIntentResponse>> {
    let created = state
        .matchmaking
        .create_match_intent(DealId::new(deal_id), &request.payer_external_id, request.payer_username.as_deref())
        .await?;
    spawn_fast_poll(state.reconciler.clone(), created.invoice_id);
    Ok(Json(CreatedIntentResponse {
        invoice_id: created.invoice_id,
        pay_url: created.pay_url,
    }))
}
