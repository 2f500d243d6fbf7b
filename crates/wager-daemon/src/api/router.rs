//! API router configuration.

use super::handlers;
use super::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/fights", get(handlers::list_upcoming_fights))
        .route("/fights/:fight_id", get(handlers::get_fight))
        .route("/fights/:fight_id/deals", get(handlers::list_open_deals))
        .route("/fights/:fight_id/intents", post(handlers::create_new_intent))
        .route("/deals/:deal_id/intents", post(handlers::create_match_intent))
        .route("/users/:external_id/deals/active", get(handlers::list_my_active_deals))
        .route("/users/:external_id/deals/shareable", get(handlers::list_my_shareable_deals));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
