//! WebSocket protocol types for the presence channel.
//!
//! # Protocol Overview
//!
//! Messages are JSON objects with a `type` field that determines their shape.
//!
//! ## Connection Flow
//!
//! 1. Client connects to the presence endpoint
//! 2. Client sends `auth` with its bearer token within 10 seconds
//! 3. Server answers `auth_ok` (carrying the session id and the expected
//!    heartbeat cadence) or `auth_error` and closes
//! 4. Server tracks the session and broadcasts `sync` with the full membership
//!    to every connected client whenever someone joins or leaves
//! 5. Client sends `heartbeat` about once per `heartbeat_interval_secs`; the
//!    server accrues work hours and answers `heartbeat_ack`
//! 6. Client may re-send `auth` to refresh its token without reconnecting
//! 7. On disconnect the session is untracked and a final heartbeat is recorded

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Role;

/// A user announced on the presence channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// User id.
    pub id: String,
    /// Display name (full name, falling back to email).
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
    /// When this session joined the channel.
    pub online_at: DateTime<Utc>,
}

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate (or re-authenticate) with a bearer token.
    Auth { token: String },
    /// Periodic activity signal.
    Heartbeat,
    /// Leave the channel; the server closes the connection.
    Leave,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication succeeded.
    AuthOk {
        session_id: String,
        heartbeat_interval_secs: u64,
    },
    /// Authentication failed.
    AuthError { message: String },
    /// Full current membership.
    Sync { members: Vec<PresenceRecord> },
    /// Result of a heartbeat.
    HeartbeatAck {
        accrued_hours: f64,
        #[serde(default)]
        skipped: Option<String>,
    },
    /// Error message from server.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_auth_deserialize() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"auth","token":"abc"}"#).unwrap();
        match msg {
            ClientMessage::Auth { token } => assert_eq!(token, "abc"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_client_heartbeat_deserialize() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Heartbeat));
    }

    #[test]
    fn test_sync_serialize() {
        let msg = ServerMessage::Sync {
            members: vec![PresenceRecord {
                id: "u1".to_string(),
                name: "Alice Johnson".to_string(),
                email: Some("alice@example.com".to_string()),
                role: Role::Employee,
                online_at: "2024-06-01T09:00:00Z".parse().unwrap(),
            }],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"sync""#));
        assert!(json.contains(r#""role":"employee""#));
        assert!(json.contains("Alice Johnson"));
    }

    #[test]
    fn test_heartbeat_ack_skipped_defaults_to_none() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"heartbeat_ack","accrued_hours":0.5}"#).unwrap();
        match msg {
            ServerMessage::HeartbeatAck { accrued_hours, skipped } => {
                assert_eq!(accrued_hours, 0.5);
                assert!(skipped.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
