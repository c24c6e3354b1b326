use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use konnect_db::Database;
use konnect_types::api::Claims;
use konnect_types::events::{GatewayCommand, GatewayEvent};
use konnect_types::models::Message;

use crate::dispatcher::Dispatcher;

/// Handle a WebSocket connection whose credential was checked at the HTTP
/// upgrade. A failed check still reaches here as `auth: None` so the client
/// is told why before the transport closes.
///
/// Connection lifecycle: Connecting -> Authenticated -> Joined -> Active ->
/// Disconnected. Joining is restricted to the caller's own user room;
/// sending requires a joined room.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    auth: Option<Claims>,
) {
    let (mut sender, mut receiver) = socket.split();

    let claims = match auth {
        Some(claims) => claims,
        None => {
            let err = GatewayEvent::Error {
                message: "Authentication error: invalid token".into(),
            };
            let _ = sender
                .send(WsMessage::Text(serde_json::to_string(&err).unwrap().into()))
                .await;
            let _ = sender.close().await;
            warn!("WebSocket client failed authentication, closing");
            return;
        }
    };

    info!("user {} connected to gateway", claims.sub);

    let (tx, mut rx) = mpsc::unbounded_channel::<GatewayEvent>();
    let conn_id = Uuid::new_v4();

    let _ = tx.send(GatewayEvent::Ready {
        user_id: claims.sub,
    });

    // Forward queued events to the client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = serde_json::to_string(&event).unwrap();
            if sender.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Read commands from the client
    let mut joined: Option<i64> = None;
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            WsMessage::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                Ok(cmd) => {
                    handle_command(&db, &dispatcher, &claims, conn_id, &mut joined, &tx, cmd)
                        .await;
                }
                Err(e) => {
                    warn!(
                        "user {} bad command: {} -- raw: {}",
                        claims.sub,
                        e,
                        &text[..text.len().min(200)]
                    );
                    let _ = tx.send(GatewayEvent::Error {
                        message: "Malformed command".into(),
                    });
                }
            },
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    if let Some(room) = joined {
        dispatcher.leave(room, conn_id).await;
    }
    send_task.abort();
    info!("user {} disconnected from gateway", claims.sub);
}

async fn handle_command(
    db: &Arc<Database>,
    dispatcher: &Dispatcher,
    claims: &Claims,
    conn_id: Uuid,
    joined: &mut Option<i64>,
    tx: &mpsc::UnboundedSender<GatewayEvent>,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::Join { user_id } => {
            // Only the caller's own room: anything else would let a client
            // eavesdrop on another user's deliveries.
            if user_id != claims.sub {
                warn!(
                    "user {} attempted to join room {}",
                    claims.sub, user_id
                );
                let _ = tx.send(GatewayEvent::Error {
                    message: "User ID mismatch".into(),
                });
                return;
            }
            dispatcher.join(user_id, conn_id, tx.clone()).await;
            *joined = Some(user_id);
            info!("user {} joined own room", user_id);
        }

        GatewayCommand::SendMessage { to, content, temp_id } => {
            if joined.is_none() {
                let _ = tx.send(GatewayEvent::SendResult {
                    temp_id: Some(temp_id),
                    success: false,
                    message: None,
                    error: Some("Join your room before sending".into()),
                });
                return;
            }
            if to <= 0 || content.trim().is_empty() {
                let _ = tx.send(GatewayEvent::SendResult {
                    temp_id: Some(temp_id),
                    success: false,
                    message: None,
                    error: Some("Missing required fields".into()),
                });
                return;
            }

            match persist_and_deliver(db, dispatcher, claims.sub, to, content, Some(temp_id.clone()))
                .await
            {
                Ok(message) => {
                    let _ = tx.send(GatewayEvent::SendResult {
                        temp_id: Some(temp_id),
                        success: true,
                        message: Some(message),
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("user {} failed to send message: {}", claims.sub, e);
                    let _ = tx.send(GatewayEvent::SendResult {
                        temp_id: Some(temp_id),
                        success: false,
                        message: None,
                        error: Some("Failed to send message".into()),
                    });
                }
            }
        }
    }
}

/// Persist a message, then deliver it to both parties' rooms. The insert is
/// the durability point: a delivery that goes nowhere (offline receiver)
/// leaves the record retrievable via the history query.
pub async fn persist_and_deliver(
    db: &Arc<Database>,
    dispatcher: &Dispatcher,
    from: i64,
    to: i64,
    content: String,
    temp_id: Option<String>,
) -> anyhow::Result<Message> {
    let db = db.clone();
    let row =
        tokio::task::spawn_blocking(move || db.insert_message(from, to, &content)).await??;

    let mut message = row.into_message();
    message.temp_id = temp_id;

    dispatcher
        .send_to_room(from, GatewayEvent::NewMessage {
            message: message.clone(),
        })
        .await;
    if to != from {
        dispatcher
            .send_to_room(to, GatewayEvent::NewMessage {
                message: message.clone(),
            })
            .await;
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use konnect_types::models::Role;

    fn test_db() -> Arc<Database> {
        let db = Database::open_in_memory().unwrap();
        db.create_user("Asha Rao", "asha@example.com", None, "hash-a", "business")
            .unwrap();
        db.create_user("Vikram Shetty", "vikram@example.com", None, "hash-b", "influencer")
            .unwrap();
        Arc::new(db)
    }

    fn claims_for(sub: i64) -> Claims {
        Claims {
            sub,
            email: format!("user{sub}@example.com"),
            role: Role::Business,
            exp: usize::MAX,
        }
    }

    fn message_count(db: &Database, a: i64, b: i64) -> usize {
        db.chat_between(a, b, None, None).unwrap().len()
    }

    #[tokio::test]
    async fn join_other_users_room_is_rejected() {
        let db = test_db();
        let dispatcher = Dispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut joined = None;

        handle_command(
            &db,
            &dispatcher,
            &claims_for(1),
            Uuid::new_v4(),
            &mut joined,
            &tx,
            GatewayCommand::Join { user_id: 2 },
        )
        .await;

        assert!(joined.is_none());
        assert_eq!(dispatcher.room_size(2).await, 0);
        assert!(matches!(rx.recv().await, Some(GatewayEvent::Error { .. })));
    }

    #[tokio::test]
    async fn join_own_room_succeeds() {
        let db = test_db();
        let dispatcher = Dispatcher::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut joined = None;

        handle_command(
            &db,
            &dispatcher,
            &claims_for(1),
            Uuid::new_v4(),
            &mut joined,
            &tx,
            GatewayCommand::Join { user_id: 1 },
        )
        .await;

        assert_eq!(joined, Some(1));
        assert_eq!(dispatcher.room_size(1).await, 1);
    }

    #[tokio::test]
    async fn send_before_join_is_rejected_without_a_row() {
        let db = test_db();
        let dispatcher = Dispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut joined = None;

        handle_command(
            &db,
            &dispatcher,
            &claims_for(1),
            Uuid::new_v4(),
            &mut joined,
            &tx,
            GatewayCommand::SendMessage {
                to: 2,
                content: "hi".into(),
                temp_id: "t1".into(),
            },
        )
        .await;

        assert!(matches!(
            rx.recv().await,
            Some(GatewayEvent::SendResult { success: false, .. })
        ));
        assert_eq!(message_count(&db, 1, 2), 0);
    }

    #[tokio::test]
    async fn send_with_empty_content_is_rejected_without_a_row() {
        let db = test_db();
        let dispatcher = Dispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = Uuid::new_v4();
        let mut joined = None;

        handle_command(
            &db,
            &dispatcher,
            &claims_for(1),
            conn,
            &mut joined,
            &tx,
            GatewayCommand::Join { user_id: 1 },
        )
        .await;
        handle_command(
            &db,
            &dispatcher,
            &claims_for(1),
            conn,
            &mut joined,
            &tx,
            GatewayCommand::SendMessage {
                to: 2,
                content: "   ".into(),
                temp_id: "t1".into(),
            },
        )
        .await;

        let mut saw_rejection = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, GatewayEvent::SendResult { success: false, .. }) {
                saw_rejection = true;
            }
        }
        assert!(saw_rejection);
        assert_eq!(message_count(&db, 1, 2), 0);
    }

    #[tokio::test]
    async fn valid_send_persists_once_and_delivers_to_both_rooms() {
        let db = test_db();
        let dispatcher = Dispatcher::new();

        // Receiver connection in its own room
        let (rx_tx, mut receiver_rx) = mpsc::unbounded_channel();
        dispatcher.join(2, Uuid::new_v4(), rx_tx).await;

        // Sender connection: join, then send
        let (tx, mut sender_rx) = mpsc::unbounded_channel();
        let conn = Uuid::new_v4();
        let mut joined = None;
        handle_command(
            &db,
            &dispatcher,
            &claims_for(1),
            conn,
            &mut joined,
            &tx,
            GatewayCommand::Join { user_id: 1 },
        )
        .await;
        handle_command(
            &db,
            &dispatcher,
            &claims_for(1),
            conn,
            &mut joined,
            &tx,
            GatewayCommand::SendMessage {
                to: 2,
                content: "hi".into(),
                temp_id: "t1".into(),
            },
        )
        .await;

        // Exactly one persisted row
        assert_eq!(message_count(&db, 1, 2), 1);

        // Receiver room got the delivery
        let delivered = match receiver_rx.recv().await {
            Some(GatewayEvent::NewMessage { message }) => message,
            other => panic!("expected NewMessage, got {other:?}"),
        };
        assert_eq!(delivered.from, 1);
        assert_eq!(delivered.to, 2);
        assert_eq!(delivered.text, "hi");

        // Sender room got the same message (same id), then the ack
        let mut sender_delivery = None;
        let mut ack = None;
        while let Ok(event) = sender_rx.try_recv() {
            match event {
                GatewayEvent::NewMessage { message } => sender_delivery = Some(message),
                GatewayEvent::SendResult {
                    success: true,
                    message,
                    temp_id,
                    ..
                } => {
                    assert_eq!(temp_id.as_deref(), Some("t1"));
                    ack = message;
                }
                _ => {}
            }
        }
        let sender_delivery = sender_delivery.expect("sender room delivery");
        assert_eq!(sender_delivery.id, delivered.id);

        let ack = ack.expect("ack message");
        assert_eq!(ack.id, delivered.id);
        assert_eq!(ack.temp_id.as_deref(), Some("t1"));
        assert_eq!(ack.timestamp, delivered.timestamp);
    }

    #[tokio::test]
    async fn unknown_receiver_fails_without_delivery() {
        let db = test_db();
        let dispatcher = Dispatcher::new();

        let result =
            persist_and_deliver(&db, &dispatcher, 1, 999, "hi".into(), None).await;
        assert!(result.is_err());
        assert_eq!(message_count(&db, 1, 999), 0);
    }
}
