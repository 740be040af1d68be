//! SSE payload envelope for the display mirror stream.

use serde::Serialize;

/// Dispatched payload carried across the SSE channel.
#[derive(Clone, Debug)]
pub struct ServerEvent {
    /// SSE event name, when the event is typed.
    pub event: Option<String>,
    /// Serialized JSON payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}
