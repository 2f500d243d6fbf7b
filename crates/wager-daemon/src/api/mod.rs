//! The presentation adapter: a small JSON API standing in for "the chat
//! surface calls the Matchmaking Engine."

mod handlers;
mod router;
mod state;

pub use router::create_router;
pub use state::AppState;
