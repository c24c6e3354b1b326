use serde::{Deserialize, Serialize};

use crate::models::Message;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: i64 },

    /// A new message was persisted and is being delivered to both rooms
    NewMessage { message: Message },

    /// Acknowledgement for a SendMessage command, delivered to the caller
    /// only. `message` is set on success, `error` on rejection.
    SendResult {
        temp_id: Option<String>,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<Message>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Fatal or per-command error
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Subscribe to the caller's own user room. Joining any other user's
    /// room is rejected.
    Join { user_id: i64 },

    /// Send a message to another user. The ack comes back as SendResult.
    SendMessage {
        to: i64,
        content: String,
        temp_id: String,
    },
}
