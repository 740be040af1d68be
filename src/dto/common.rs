//! Shared wire types used by both the WebSocket and SSE payloads.

use serde::{Deserialize, Serialize};

/// Which kind of client a WebSocket connection identifies as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// The main display: renders the board, consumes broadcasts.
    Display,
    /// The moderator console: sends intents, mirrors the board.
    Console,
}

/// Travel direction for the character run animation across the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Toward higher positions (left to right).
    Forward,
    /// Toward lower positions (right to left).
    Backward,
}

/// Moderator arrow-key step across the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDirection {
    /// Advance toward the end of the board.
    Next,
    /// Go back toward the start.
    Previous,
}
