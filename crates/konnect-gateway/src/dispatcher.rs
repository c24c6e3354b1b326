use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use konnect_types::events::GatewayEvent;

/// Manages per-user rooms and delivers events to their members.
///
/// A room is keyed by user id; its members are the live connections that
/// joined it. A user may hold several connections (multiple tabs), each
/// tracked by its own connection id.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// user_id -> (conn_id -> event sender)
    rooms: RwLock<HashMap<i64, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a user's room.
    pub async fn join(&self, user_id: i64, conn_id: Uuid, tx: mpsc::UnboundedSender<GatewayEvent>) {
        let mut rooms = self.inner.rooms.write().await;
        rooms.entry(user_id).or_default().insert(conn_id, tx);
    }

    /// Remove a connection from a user's room; drops the room when empty.
    pub async fn leave(&self, user_id: i64, conn_id: Uuid) {
        let mut rooms = self.inner.rooms.write().await;
        if let Some(members) = rooms.get_mut(&user_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(&user_id);
            }
        }
    }

    /// Deliver an event to every member of a user's room. Senders whose
    /// connection is gone are skipped; membership cleanup happens on
    /// disconnect, not here.
    pub async fn send_to_room(&self, user_id: i64, event: GatewayEvent) {
        let rooms = self.inner.rooms.read().await;
        if let Some(members) = rooms.get(&user_id) {
            for tx in members.values() {
                let _ = tx.send(event.clone());
            }
        }
    }

    pub async fn room_size(&self, user_id: i64) -> usize {
        self.inner
            .rooms
            .read()
            .await
            .get(&user_id)
            .map_or(0, |m| m.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_and_leave_track_membership() {
        let dispatcher = Dispatcher::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Uuid::new_v4();

        dispatcher.join(7, conn, tx).await;
        assert_eq!(dispatcher.room_size(7).await, 1);

        dispatcher.leave(7, conn).await;
        assert_eq!(dispatcher.room_size(7).await, 0);
    }

    #[tokio::test]
    async fn send_to_room_reaches_every_member() {
        let dispatcher = Dispatcher::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        dispatcher.join(1, Uuid::new_v4(), tx_a).await;
        dispatcher.join(1, Uuid::new_v4(), tx_b).await;

        dispatcher
            .send_to_room(1, GatewayEvent::Ready { user_id: 1 })
            .await;

        assert!(matches!(rx_a.recv().await, Some(GatewayEvent::Ready { user_id: 1 })));
        assert!(matches!(rx_b.recv().await, Some(GatewayEvent::Ready { user_id: 1 })));
    }

    #[tokio::test]
    async fn send_to_missing_room_is_a_noop() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .send_to_room(42, GatewayEvent::Ready { user_id: 42 })
            .await;
        assert_eq!(dispatcher.room_size(42).await, 0);
    }
}
