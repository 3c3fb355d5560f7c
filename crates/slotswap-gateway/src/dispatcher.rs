use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, broadcast, mpsc};
use uuid::Uuid;

use slotswap_types::events::{DomainEvent, ServerEvent};
use slotswap_types::models::UserId;

/// A connection subscribed to a chat room.
struct RoomMember {
    user_id: UserId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

/// Maps live connections to logical groups and relays events between them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Domain events for outer layers. Sends with no subscribers are dropped.
    events_tx: broadcast::Sender<DomainEvent>,

    /// Per-user notification groups: user_id -> (conn_id -> sender)
    user_groups: RwLock<HashMap<UserId, HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>>>,

    /// Per-pair chat groups: room key -> (conn_id -> member)
    rooms: RwLock<HashMap<String, HashMap<Uuid, RoomMember>>>,

    /// Held across persist + broadcast so a room sees messages in creation order.
    room_sequencers: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                events_tx,
                user_groups: RwLock::new(HashMap::new()),
                rooms: RwLock::new(HashMap::new()),
                room_sequencers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to domain events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.inner.events_tx.subscribe()
    }

    pub fn publish(&self, event: DomainEvent) {
        let _ = self.inner.events_tx.send(event);
    }

    // -- Per-user groups --

    /// Join a user's notification group. Returns (conn_id, receiver).
    pub async fn join_user_group(&self, user_id: UserId) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_groups
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id, tx);
        (conn_id, rx)
    }

    pub async fn leave_user_group(&self, user_id: UserId, conn_id: Uuid) {
        let mut groups = self.inner.user_groups.write().await;
        if let Some(conns) = groups.get_mut(&user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                groups.remove(&user_id);
            }
        }
    }

    /// Send to every live connection of a user. Returns how many accepted it.
    pub async fn send_to_user(&self, user_id: UserId, event: ServerEvent) -> usize {
        let groups = self.inner.user_groups.read().await;
        groups.get(&user_id).map_or(0, |conns| {
            conns
                .values()
                .filter(|tx| tx.send(event.clone()).is_ok())
                .count()
        })
    }

    pub async fn connection_count(&self, user_id: UserId) -> usize {
        self.inner
            .user_groups
            .read()
            .await
            .get(&user_id)
            .map_or(0, HashMap::len)
    }

    // -- Chat rooms --

    pub async fn join_room(&self, room: &str, user_id: UserId) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .rooms
            .write()
            .await
            .entry(room.to_string())
            .or_default()
            .insert(conn_id, RoomMember { user_id, tx });
        (conn_id, rx)
    }

    pub async fn leave_room(&self, room: &str, conn_id: Uuid) {
        let emptied = {
            let mut rooms = self.inner.rooms.write().await;
            match rooms.get_mut(room) {
                Some(members) => {
                    members.remove(&conn_id);
                    if members.is_empty() {
                        rooms.remove(room);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };

        if emptied {
            self.release_sequencer(room).await;
        }
    }

    /// Deliver to every member of a room, optionally skipping all connections
    /// of one user. Returns how many connections accepted it.
    pub async fn publish_to_room(&self, room: &str, event: ServerEvent, skip_user: Option<UserId>) -> usize {
        let rooms = self.inner.rooms.read().await;
        rooms.get(room).map_or(0, |members| {
            members
                .values()
                .filter(|m| Some(m.user_id) != skip_user)
                .filter(|m| m.tx.send(event.clone()).is_ok())
                .count()
        })
    }

    pub async fn room_sequencer(&self, room: &str) -> Arc<Mutex<()>> {
        self.inner
            .room_sequencers
            .lock()
            .await
            .entry(room.to_string())
            .or_default()
            .clone()
    }

    /// Drop a room's sequencer once no sender holds it and nobody is
    /// connected. Callers drop their own clone first.
    pub async fn release_sequencer(&self, room: &str) {
        let mut sequencers = self.inner.room_sequencers.lock().await;
        if !sequencers.get(room).is_some_and(|s| Arc::strong_count(s) == 1) {
            return;
        }
        if self.inner.rooms.read().await.contains_key(room) {
            return;
        }
        sequencers.remove(room);
    }

    #[cfg(test)]
    pub(crate) async fn sequencer_count(&self) -> usize {
        self.inner.room_sequencers.lock().await.len()
    }

    pub async fn room_size(&self, room: &str) -> usize {
        self.inner.rooms.read().await.get(room).map_or(0, HashMap::len)
    }
}
