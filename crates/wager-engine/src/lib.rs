//! Orchestration layer sitting between storage/payments/catalog and the
//! presentation adapter: matchmaking, invoice reconciliation,
//! settlement, and admin result reminders.

mod admin_notify;
mod error;
mod matchmaking;
mod reconciler;
mod settlement;
mod state;

pub use admin_notify::{AdminNotifier, AdminReminder, AdminReminderLoop};
pub use error::{EngineError, EngineResult};
pub use matchmaking::{CreatedIntent, MatchmakingEngine};
pub use reconciler::{ReconcileReport, Reconciler, ReconcilerLoop};
pub use settlement::{SettlementEngine, SettlementLoop, SettlementReport};
pub use state::is_legal_transition;
