//! SSE fan-out for read-only display mirrors.

use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::dto::sse::ServerEvent;
use crate::state::{Envelope, SharedState};

/// Convert a hub subscription into an SSE response, forwarding every
/// broadcast event and cleaning up once the client disconnects.
pub fn display_stream(
    state: &SharedState,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    let mut receiver = state.hub().subscribe();

    // Small bounded channel between forwarder and response.
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let handshake = Event::default()
            .event("info")
            .data("display stream connected");
        if tx.send(Ok(handshake)).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                received = receiver.recv() => {
                    match received {
                        Ok(envelope) => {
                            let Some(event) = to_sse_event(envelope) else {
                                continue;
                            };
                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {
                            // Skip lagged messages but keep the stream alive;
                            // displays reconcile via the state endpoint.
                            continue;
                        }
                    }
                }
            }
        }

        tracing::info!("display SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_sse_event(envelope: Envelope) -> Option<Event> {
    let name = envelope.message.name().to_string();
    match ServerEvent::json(Some(name), &envelope.message) {
        Ok(payload) => {
            let mut event = Event::default().data(payload.data);
            if let Some(name) = payload.event {
                event = event.event(name);
            }
            Some(event)
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize SSE payload");
            None
        }
    }
}
