use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use slotswap_types::events::{ChatCommand, ServerEvent};
use slotswap_types::models::UserId;

use crate::chat::ChatRelay;
use crate::dispatcher::Dispatcher;
use crate::rooms::{room_key, user_group};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// What a socket was opened for. Eligibility is checked before the upgrade.
pub enum ConnectionKind {
    Notifications,
    Chat { relay: ChatRelay, partner_id: UserId },
}

/// Drive a pre-authenticated socket until either side goes away. The token
/// was validated at the HTTP upgrade layer, so we go straight to Ready.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, user_id: UserId, kind: ConnectionKind) {
    let (mut sender, receiver) = socket.split();

    let (group, conn_id, events_rx) = match &kind {
        ConnectionKind::Notifications => {
            let (conn_id, rx) = dispatcher.join_user_group(user_id).await;
            (user_group(user_id), conn_id, rx)
        }
        ConnectionKind::Chat { partner_id, .. } => {
            let room = room_key(user_id, *partner_id);
            let (conn_id, rx) = dispatcher.join_room(&room, user_id).await;
            (room, conn_id, rx)
        }
    };

    info!("User {} joined {} ({})", user_id, group, conn_id);

    let ready = ServerEvent::Ready {
        user_id,
        group: group.clone(),
    };
    if send_event(&mut sender, &ready).await {
        run_connection_loop(sender, receiver, events_rx, user_id, &kind).await;
    }

    match &kind {
        ConnectionKind::Notifications => dispatcher.leave_user_group(user_id, conn_id).await,
        ConnectionKind::Chat { .. } => dispatcher.leave_room(&group, conn_id).await,
    }
    info!("User {} left {} ({})", user_id, group, conn_id);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut events_rx: mpsc::UnboundedReceiver<ServerEvent>,
    user_id: UserId,
    kind: &ConnectionKind,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward group events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read frames from client. Notification sockets are push-only.
    let chat = match kind {
        ConnectionKind::Chat { relay, partner_id } => Some((relay.clone(), *partner_id)),
        ConnectionKind::Notifications => None,
    };
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match &chat {
                    Some((relay, partner_id)) => {
                        handle_chat_frame(relay, user_id, *partner_id, &text).await;
                    }
                    None => debug!("User {} sent a frame on a notification socket, ignoring", user_id),
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn handle_chat_frame(relay: &ChatRelay, user_id: UserId, partner_id: UserId, text: &str) {
    let cmd = match serde_json::from_str::<ChatCommand>(text) {
        Ok(cmd) => cmd,
        Err(e) => {
            warn!(
                "User {} bad chat frame: {} -- raw: {}",
                user_id,
                e,
                text.chars().take(200).collect::<String>()
            );
            return;
        }
    };

    match cmd {
        ChatCommand::ChatMessage { message, attachment } => {
            if let Err(e) = relay
                .send_message(user_id, partner_id, &message, attachment.as_deref())
                .await
            {
                warn!("User {} chat message to {} refused: {}", user_id, partner_id, e);
            }
        }
        ChatCommand::Typing { is_typing } => {
            relay.typing(user_id, partner_id, is_typing).await;
        }
    }
}

/// Returns false once the client is gone.
async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &ServerEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
