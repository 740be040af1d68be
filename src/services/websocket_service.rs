//! WebSocket session lifecycle for console and display clients.
//!
//! A connection must identify its role within a deadline, after which it
//! exchanges the named JSON events of the wire protocol. Every broadcast from
//! the hub is forwarded to the socket except envelopes the connection itself
//! originated; local mutations keep flowing even when no peer is connected.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dto::ws::{ClientMessage, ServerMessage};
use crate::services::sync_service;
use crate::state::{ClientConnection, SharedState};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle the full lifecycle for an individual client WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
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
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let role = match serde_json::from_str::<ClientMessage>(&initial_message) {
        Ok(ClientMessage::Identification { role }) => role,
        Ok(_) => {
            warn!("first message was not identification");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse identification message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let client_id = Uuid::new_v4();
    state.clients().insert(
        client_id,
        ClientConnection {
            id: client_id,
            role,
            tx: outbound_tx.clone(),
        },
    );
    info!(id = %client_id, ?role, "client connected");

    // Forward hub broadcasts onto this socket, skipping our own events.
    let forwarder_task = spawn_hub_forwarder(&state, client_id, outbound_tx.clone());

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(inbound) => {
                        debug!(id = %client_id, event = ?inbound, "received client event");
                        if let Some(reply) = sync_service::dispatch(&state, client_id, inbound) {
                            send_message_to_websocket(&outbound_tx, &reply, "direct reply");
                        }
                    }
                    Err(err) => {
                        warn!(id = %client_id, error = %err, "failed to parse client event");
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(id = %client_id, "client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(id = %client_id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.clients().remove(&client_id);
    forwarder_task.abort();
    info!(id = %client_id, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Serialize a payload and push it onto the provided writer channel.
///
/// Serialization failures are permanent (a bug in the payload type) and only
/// logged; a closed writer means the connection is already going away.
pub fn send_message_to_websocket(
    tx: &mpsc::UnboundedSender<Message>,
    message: &ServerMessage,
    context: &str,
) {
    match serde_json::to_string(message) {
        Ok(payload) => {
            if tx.send(Message::Text(payload.into())).is_err() {
                debug!(context, "writer closed; dropping outbound message");
            }
        }
        Err(err) => warn!(context, error = %err, "failed to serialize outbound message"),
    }
}

fn spawn_hub_forwarder(
    state: &SharedState,
    client_id: Uuid,
    tx: mpsc::UnboundedSender<Message>,
) -> JoinHandle<()> {
    let mut receiver = state.hub().subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(envelope) => {
                    if envelope.origin == Some(client_id) {
                        continue;
                    }
                    send_message_to_websocket(&tx, &envelope.message, "hub broadcast");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    // A slow consumer missed events; it reconciles with a
                    // full-state request, so just keep streaming.
                    warn!(id = %client_id, skipped, "client lagged behind broadcasts");
                }
            }
        }
    })
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
