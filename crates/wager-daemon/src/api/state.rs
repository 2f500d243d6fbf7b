//! Shared application state for API handlers.

use std::sync::Arc;
use wager_engine::{MatchmakingEngine, Reconciler};

#[derive(Clone)]
pub struct AppState {
    pub matchmaking: Arc<MatchmakingEngine>,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    pub fn new(matchmaking: Arc<MatchmakingEngine>, reconciler: Arc<Reconciler>) -> Self {
        Self { matchmaking, reconciler }
    }
}
