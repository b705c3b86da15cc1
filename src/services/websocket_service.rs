use axum::extract::ws::{Message, WebSocket};
use futures::StreamExt;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::ClientMessage,
    state::{SharedState, session::normalize_code},
};

/// Room membership established by the `attach` message.
struct Attachment {
    connection_id: Uuid,
    session_id: String,
    player_id: Uuid,
}

/// Handle the full lifecycle of one real-time connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (sender, mut receiver) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        if let Err(err) = UnboundedReceiverStream::new(outbound_rx)
            .map(Ok::<Message, axum::Error>)
            .forward(sender)
            .await
        {
            debug!(error = %err, "websocket writer stopped");
        }
    });

    let attach_timeout = state.config().attach_timeout;
    let initial_message = match tokio::time::timeout(attach_timeout, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket attach timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let attachment = match ClientMessage::from_json_str(&initial_message) {
        Ok(ClientMessage::Attach {
            session_id,
            player_id,
            player_name,
        }) => {
            let attachment = Attachment {
                connection_id: Uuid::new_v4(),
                session_id: normalize_code(&session_id),
                player_id,
            };
            attach(&state, &attachment, player_name.as_deref(), &outbound_tx).await;
            attachment
        }
        Ok(_) => {
            warn!("first message was not attach");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse client message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match ClientMessage::from_json_str(&text) {
                Ok(message) => handle_message(&state, &attachment, message).await,
                Err(err) => {
                    warn!(
                        session = %attachment.session_id,
                        error = %err,
                        "failed to parse client message"
                    );
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                debug!(session = %attachment.session_id, "client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(session = %attachment.session_id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.rooms().detach(attachment.connection_id);
    info!(
        session = %attachment.session_id,
        player = %attachment.player_id,
        "real-time client disconnected"
    );

    finalize(writer_task, outbound_tx).await;
}

async fn attach(
    state: &SharedState,
    attachment: &Attachment,
    player_name: Option<&str>,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) {
    state.rooms().attach(
        &attachment.session_id,
        attachment.connection_id,
        outbound_tx.clone(),
    );

    let resident = state.registry().announce(&attachment.session_id).await;
    info!(
        session = %attachment.session_id,
        player = %attachment.player_id,
        name = player_name.unwrap_or_default(),
        resident,
        "real-time client attached"
    );
}

/// Apply one message from an attached client. Stale or foreign ids are silent no-ops.
async fn handle_message(state: &SharedState, attachment: &Attachment, message: ClientMessage) {
    if let Some(session_id) = message.session_id() {
        if normalize_code(session_id) != attachment.session_id {
            warn!(
                expected = %attachment.session_id,
                got = %session_id,
                "ignoring message for another session"
            );
            return;
        }
    }

    let registry = state.registry();
    match message {
        ClientMessage::Increment { player_id, .. } => {
            if !registry.add_piece(&attachment.session_id, player_id).await {
                debug!(session = %attachment.session_id, player = %player_id, "increment ignored");
            }
        }
        ClientMessage::Finish { player_id, .. } => {
            if !registry.finish_player(&attachment.session_id, player_id).await {
                debug!(session = %attachment.session_id, player = %player_id, "finish ignored");
            }
        }
        ClientMessage::Attach { .. } => {
            warn!(session = %attachment.session_id, "ignoring duplicate attach message");
        }
        ClientMessage::Unknown => {
            debug!(session = %attachment.session_id, "ignoring unknown message type");
        }
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dto::ws::ServerMessage,
        services::write_behind::PersistQueue,
        state::AppState,
    };

    fn text(message: Option<Message>) -> ServerMessage {
        match message {
            Some(Message::Text(text)) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn attach_sends_snapshot_and_messages_mutate_the_session() {
        let (queue, _receiver) = PersistQueue::channel();
        let state = AppState::new(AppConfig::default(), queue);
        let alice = state
            .registry()
            .create_session(Some("ABC123".into()), "Friday", "Alice")
            .unwrap()
            .player_id;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let attachment = Attachment {
            connection_id: Uuid::new_v4(),
            session_id: normalize_code("abc123"),
            player_id: alice,
        };
        attach(&state, &attachment, Some("Alice"), &tx).await;
        assert!(matches!(text(rx.recv().await), ServerMessage::State { .. }));

        handle_message(
            &state,
            &attachment,
            ClientMessage::Increment {
                session_id: "abc123".into(),
                player_id: alice,
            },
        )
        .await;
        match text(rx.recv().await) {
            ServerMessage::State { session } => assert_eq!(session.players[0].score, 1),
            other => panic!("unexpected {other:?}"),
        }

        // Foreign session ids are ignored.
        handle_message(
            &state,
            &attachment,
            ClientMessage::Increment {
                session_id: "OTHER1".into(),
                player_id: alice,
            },
        )
        .await;
        assert!(rx.try_recv().is_err());

        handle_message(
            &state,
            &attachment,
            ClientMessage::Finish {
                session_id: "ABC123".into(),
                player_id: alice,
            },
        )
        .await;
        assert!(matches!(text(rx.recv().await), ServerMessage::State { .. }));
        assert!(matches!(text(rx.recv().await), ServerMessage::Ended { .. }));

        state.rooms().detach(attachment.connection_id);
        state.rooms().detach(attachment.connection_id);
        assert_eq!(state.rooms().member_count("ABC123"), 0);
    }

    #[tokio::test]
    async fn observers_can_attach_to_unknown_sessions() {
        let (queue, _receiver) = PersistQueue::channel();
        let state = AppState::new(AppConfig::default(), queue);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let attachment = Attachment {
            connection_id: Uuid::new_v4(),
            session_id: "NOPE42".into(),
            player_id: Uuid::new_v4(),
        };

        attach(&state, &attachment, None, &tx).await;
        assert_eq!(state.rooms().member_count("NOPE42"), 1);
        assert!(rx.try_recv().is_err());
        assert!(state.registry().is_empty());
    }
}
