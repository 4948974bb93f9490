use axum::{
    debug_handler,
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::{
    auth::CurrentUser,
    notify::{caregiver_topic, elderly_topic, Notifier},
    AppError, AppResult, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/{topic}", get(subscribe))
}

/// Topics a user may listen on: the ones addressed to them.
fn allowed(user_id: &str, topic: &str) -> bool {
    topic == elderly_topic(user_id) || topic == caregiver_topic(user_id)
}

#[debug_handler(state = AppState)]
pub(crate) async fn subscribe(
    State(notifier): State<Notifier>,
    CurrentUser(user): CurrentUser,
    Path(topic): Path<String>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    if !allowed(&user.id, &topic) {
        return Err(AppError::not_found("Unknown topic"));
    }
    Ok(ws.on_upgrade(move |stream| stream_events(stream, notifier, topic)))
}

async fn stream_events(stream: WebSocket, notifier: Notifier, topic: String) {
    let mut rx = notifier.subscribe();
    let (mut sender, mut receiver) = stream.split();

    let forward_topic = topic.clone();
    let mut forward_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(topic = %forward_topic, skipped, "websocket subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if event.topic != forward_topic {
                continue;
            }
            let Ok(text) = serde_json::to_string(&event.payload) else {
                continue;
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // inbound frames are ignored; the loop only notices the client leaving
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut forward_task => read_task.abort(),
        _ = &mut read_task => forward_task.abort(),
    }
    debug!(topic = %topic, "websocket closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_own_topics_allowed() {
        assert!(allowed("u1", "elderly-u1"));
        assert!(allowed("u1", "caregiver-u1"));
        assert!(!allowed("u1", "elderly-u2"));
        assert!(!allowed("u1", "u1"));
    }
}
