mod ask;
mod history;
pub mod store;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::{memory, AppState};

pub use store::Message;

/// Chat routes live under `/memory` next to the memory endpoints.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ask", post(ask::ask))
        .route("/ask-avatar", post(ask::ask_avatar))
        .route("/ask-auto-avatar", post(ask::ask_auto_avatar))
        .route("/ask-game-avatar", post(ask::ask_game_avatar))
        .route("/introduce", post(ask::introduce))
        .route("/chats", get(history::chats))
        .route("/{id}", delete(history::remove))
        .merge(memory::router())
}
