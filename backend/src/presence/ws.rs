//! WebSocket handler for the presence channel.
//!
//! Protocol:
//! - Client sends `{ "type": "auth", "token": "<jwt>" }` within 10 seconds
//! - Server responds with `auth_ok` or `auth_error` (and closes)
//! - After auth the session is tracked and `sync` events carry the membership
//! - `heartbeat` accrues work hours and is answered with `heartbeat_ack`
//! - `auth` may be re-sent to refresh the token mid-connection
//! - On teardown the session is untracked and a final heartbeat recorded

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt as FuturesStreamExt};
use tokio::time::Duration;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt as TokioStreamExt;
use uuid::Uuid;

use backoffice_common::{Capability, ClientMessage, PresenceRecord, ServerMessage};

use crate::models::user::User;
use crate::AppState;

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// GET /realtime/presence
pub async fn presence_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_presence(socket, state))
}

async fn handle_presence(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let token = match tokio::time::timeout(AUTH_TIMEOUT, FuturesStreamExt::next(&mut ws_rx)).await {
        Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Auth { token }) => token,
            Ok(_) => {
                let _ = send_auth_error(&mut ws_tx, "Expected auth message").await;
                return;
            }
            Err(e) => {
                let _ = send_auth_error(&mut ws_tx, &format!("Invalid message format: {}", e)).await;
                return;
            }
        },
        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
            tracing::debug!("Presence client disconnected before auth");
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = send_auth_error(&mut ws_tx, "Expected text message with auth").await;
            return;
        }
        Ok(Some(Err(e))) => {
            tracing::warn!("Presence WS error during auth: {}", e);
            return;
        }
        Err(_) => {
            let _ = send_auth_error(&mut ws_tx, "Authentication timeout").await;
            return;
        }
    };

    let user = match authenticate(&state, &token).await {
        Ok(user) => user,
        Err(msg) => {
            let _ = send_auth_error(&mut ws_tx, &msg).await;
            return;
        }
    };

    let session_id = Uuid::new_v4().to_string();
    let auth_ok = ServerMessage::AuthOk {
        session_id: session_id.clone(),
        heartbeat_interval_secs: state.config.tracking.heartbeat_interval_secs,
    };
    if send_message(&mut ws_tx, &auth_ok).await.is_err() {
        return;
    }

    // Subscribe first so this client also receives its own join
    let mut events = BroadcastStream::new(state.presence.subscribe());
    state
        .presence
        .track(&session_id, presence_record(&user))
        .await;

    tracing::info!("User {} joined presence (session {})", user.id, session_id);

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately
    ping_interval.tick().await;

    let mut revoked = false;
    loop {
        tokio::select! {
            Some(event) = TokioStreamExt::next(&mut events) => {
                match event {
                    Ok(members) => {
                        // Every session of this user was dropped, e.g. the account was deleted
                        if !members.iter().any(|m| m.id == user.id) {
                            tracing::info!("Presence session {} closed: user {} removed", session_id, user.id);
                            let _ = send_message(&mut ws_tx, &ServerMessage::Error {
                                message: "Session revoked".to_string(),
                            }).await;
                            revoked = true;
                            break;
                        }
                        if send_message(&mut ws_tx, &ServerMessage::Sync { members }).await.is_err() {
                            break;
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(n)) => {
                        tracing::warn!("Presence session {} lagged, skipped {} events", session_id, n);
                        let members = state.presence.members().await;
                        if send_message(&mut ws_tx, &ServerMessage::Sync { members }).await.is_err() {
                            break;
                        }
                    }
                }
            }

            Some(msg_result) = FuturesStreamExt::next(&mut ws_rx) => {
                match msg_result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Auth { token }) => {
                            let reply = match authenticate(&state, &token).await {
                                Ok(refreshed) if refreshed.id == user.id => {
                                    tracing::debug!("Presence session {} re-authenticated", session_id);
                                    ServerMessage::AuthOk {
                                        session_id: session_id.clone(),
                                        heartbeat_interval_secs: state.config.tracking.heartbeat_interval_secs,
                                    }
                                }
                                Ok(_) => ServerMessage::AuthError {
                                    message: "Token belongs to a different user".to_string(),
                                },
                                // Keep the connection; the client can retry with a fresh token
                                Err(message) => ServerMessage::AuthError { message },
                            };
                            if send_message(&mut ws_tx, &reply).await.is_err() {
                                break;
                            }
                        }
                        Ok(ClientMessage::Heartbeat) => {
                            let report = state.tracker.record_heartbeat(&user.id, Utc::now());
                            let reply = if report.success {
                                ServerMessage::HeartbeatAck {
                                    accrued_hours: report.accrued_hours,
                                    skipped: report.skipped.map(|reason| reason.to_string()),
                                }
                            } else {
                                ServerMessage::Error {
                                    message: report
                                        .error
                                        .unwrap_or_else(|| "Failed to record heartbeat".to_string()),
                                }
                            };
                            if send_message(&mut ws_tx, &reply).await.is_err() {
                                break;
                            }
                        }
                        Ok(ClientMessage::Leave) => {
                            tracing::debug!("Presence session {} left", session_id);
                            break;
                        }
                        Err(e) => {
                            tracing::debug!("Presence WS received malformed message: {}", e);
                            let error = ServerMessage::Error {
                                message: format!("Invalid message format: {}", e),
                            };
                            if send_message(&mut ws_tx, &error).await.is_err() {
                                break;
                            }
                        }
                    },
                    Ok(Message::Ping(data)) => {
                        if ws_tx.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => {
                        tracing::debug!("Presence session {} sent close frame", session_id);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Presence WS error on session {}: {}", session_id, e);
                        break;
                    }
                }
            }

            _ = ping_interval.tick() => {
                if ws_tx.send(Message::Ping(vec![])).await.is_err() {
                    break;
                }
            }

            else => break,
        }
    }

    state.presence.untrack(&session_id).await;
    if revoked {
        return;
    }
    let report = state.tracker.record_heartbeat(&user.id, Utc::now());
    tracing::info!(
        "User {} left presence (session {}, final accrual {:.6}h)",
        user.id,
        session_id,
        report.accrued_hours
    );
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/realtime/presence", get(presence_ws))
        .with_state(state)
}

async fn authenticate(state: &AppState, token: &str) -> Result<User, String> {
    let auth_user = state
        .verifier
        .validate_token(token)
        .await
        .map_err(|e| e.to_string())?;
    let user = state
        .resolve_user(&auth_user, Utc::now())
        .map_err(|e| format!("Failed to resolve user: {}", e))?;

    if !user.role.can(Capability::TrackPresence) {
        return Err("Presence not available for this role".to_string());
    }
    Ok(user)
}

fn presence_record(user: &User) -> PresenceRecord {
    PresenceRecord {
        id: user.id.clone(),
        name: user.display_name(),
        email: user.email.clone(),
        role: user.role,
        online_at: Utc::now(),
    }
}

async fn send_auth_error<S>(
    sink: &mut S,
    message: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let msg = ServerMessage::AuthError {
        message: message.to_string(),
    };
    send_message(sink, &msg).await
}

async fn send_message<S>(
    sink: &mut S,
    msg: &ServerMessage,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}
