use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use http::{header, Request, StatusCode};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

use backoffice_backend::models::user::UserUpdate;
use backoffice_backend::test_util::{bearer, create_test_state, generate_test_jwt, TEST_ADMIN_EMAIL};
use backoffice_backend::{app, AppState};
use backoffice_common::{ClientMessage, PresenceRecord, Role, ServerMessage};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(state: Arc<AppState>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });
    format!("ws://{}/realtime/presence", addr)
}

async fn send(socket: &mut Socket, msg: &ClientMessage) {
    let json = serde_json::to_string(msg).unwrap();
    socket.send(Message::Text(json)).await.unwrap();
}

/// Next protocol message, skipping keep-alive frames.
async fn recv(socket: &mut Socket) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                other => panic!("unexpected frame: {:?}", other),
            }
        }
    })
    .await
    .expect("timed out waiting for a server message")
}

async fn recv_sync(socket: &mut Socket) -> Vec<PresenceRecord> {
    match recv(socket).await {
        ServerMessage::Sync { members } => members,
        other => panic!("expected sync, got {:?}", other),
    }
}

async fn join(url: &str, token: &str) -> (Socket, String) {
    let (mut socket, _) = connect_async(url).await.unwrap();
    send(&mut socket, &ClientMessage::Auth { token: token.to_string() }).await;
    match recv(&mut socket).await {
        ServerMessage::AuthOk { session_id, heartbeat_interval_secs } => {
            assert_eq!(heartbeat_interval_secs, 60);
            (socket, session_id)
        }
        other => panic!("expected auth_ok, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejects_invalid_token() {
    let storage = tempfile::tempdir().unwrap();
    let state = create_test_state(storage.path());
    let url = start_server(state.clone()).await;

    let (mut socket, _) = connect_async(url.as_str()).await.unwrap();
    send(&mut socket, &ClientMessage::Auth { token: "garbage".to_string() }).await;
    assert!(matches!(recv(&mut socket).await, ServerMessage::AuthError { .. }));
    assert_eq!(state.presence.session_count().await, 0);
}

#[tokio::test]
async fn test_rejects_non_auth_first_message() {
    let storage = tempfile::tempdir().unwrap();
    let state = create_test_state(storage.path());
    let url = start_server(state).await;

    let (mut socket, _) = connect_async(url.as_str()).await.unwrap();
    send(&mut socket, &ClientMessage::Heartbeat).await;
    assert!(matches!(recv(&mut socket).await, ServerMessage::AuthError { .. }));
}

#[tokio::test]
async fn test_sync_lists_each_user_once() {
    let storage = tempfile::tempdir().unwrap();
    let state = create_test_state(storage.path());
    let url = start_server(state.clone()).await;
    let token = generate_test_jwt("alice", Some("alice@example.com"), Some(Utc::now()));

    let (mut first, first_session) = join(&url, &token).await;
    let members = recv_sync(&mut first).await;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id, "alice");

    // Second tab of the same user
    let (mut second, second_session) = join(&url, &token).await;
    assert_ne!(first_session, second_session);
    assert_eq!(recv_sync(&mut second).await.len(), 1);
    assert_eq!(recv_sync(&mut first).await.len(), 1);
    assert_eq!(state.presence.session_count().await, 2);

    let bob = generate_test_jwt("bob", None, Some(Utc::now()));
    let (_third, _) = join(&url, &bob).await;
    let ids: Vec<String> = recv_sync(&mut first).await.into_iter().map(|m| m.id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&"alice".to_string()) && ids.contains(&"bob".to_string()));
}

#[tokio::test]
async fn test_heartbeat_ack_and_leave() {
    let storage = tempfile::tempdir().unwrap();
    let state = create_test_state(storage.path());
    let url = start_server(state.clone()).await;
    let token = generate_test_jwt("alice", None, Some(Utc::now() - chrono::Duration::seconds(60)));

    let (mut socket, _) = join(&url, &token).await;
    recv_sync(&mut socket).await;

    send(&mut socket, &ClientMessage::Heartbeat).await;
    match recv(&mut socket).await {
        ServerMessage::HeartbeatAck { accrued_hours, skipped } => {
            assert!(accrued_hours > 59.0 / 3600.0 && accrued_hours < 62.0 / 3600.0);
            assert_eq!(skipped, None);
        }
        other => panic!("expected heartbeat_ack, got {:?}", other),
    }

    // Re-auth keeps the session
    send(&mut socket, &ClientMessage::Auth { token: token.clone() }).await;
    assert!(matches!(recv(&mut socket).await, ServerMessage::AuthOk { .. }));

    send(&mut socket, &ClientMessage::Leave).await;

    let mut remaining = 1;
    for _ in 0..50 {
        remaining = state.presence.session_count().await;
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(remaining, 0);

    let user = state.store.get_user("alice").unwrap();
    assert!(user.last_active_timestamp.is_some());
}

#[tokio::test]
async fn test_staff_on_duty_lists_live_employees() {
    let storage = tempfile::tempdir().unwrap();
    let state = create_test_state(storage.path());
    let url = start_server(state.clone()).await;

    let employee = generate_test_jwt("erin", None, Some(Utc::now()));
    let member = generate_test_jwt("mo", None, Some(Utc::now()));
    let admin = generate_test_jwt("admin-1", Some(TEST_ADMIN_EMAIL), Some(Utc::now()));

    // Create erin, then promote them before they join
    let req = Request::builder()
        .uri("/api/me")
        .header(header::AUTHORIZATION, bearer(&employee))
        .body(Body::empty())
        .unwrap();
    assert_eq!(app(state.clone()).oneshot(req).await.unwrap().status(), StatusCode::OK);
    state
        .store
        .update_user("erin", &UserUpdate { role: Some(Role::Employee), ..Default::default() })
        .unwrap();

    let (mut erin, _) = join(&url, &employee).await;
    recv_sync(&mut erin).await;
    let (mut mo, _) = join(&url, &member).await;
    recv_sync(&mut mo).await;

    let req = Request::builder()
        .uri("/admin/api/presence")
        .header(header::AUTHORIZATION, bearer(&admin))
        .body(Body::empty())
        .unwrap();
    let response = app(state.clone()).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let on_duty: Vec<PresenceRecord> = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(on_duty.len(), 1);
    assert_eq!(on_duty[0].id, "erin");
    assert_eq!(on_duty[0].role, Role::Employee);
}

#[tokio::test]
async fn test_deleting_user_closes_their_session() {
    let storage = tempfile::tempdir().unwrap();
    let state = create_test_state(storage.path());
    let url = start_server(state.clone()).await;
    let token = generate_test_jwt("carol", None, Some(Utc::now()));
    let admin = generate_test_jwt("admin-1", Some(TEST_ADMIN_EMAIL), Some(Utc::now()));

    let (mut socket, _) = join(&url, &token).await;
    recv_sync(&mut socket).await;

    let req = Request::builder()
        .method("DELETE")
        .uri("/admin/api/users/carol")
        .header(header::AUTHORIZATION, bearer(&admin))
        .body(Body::empty())
        .unwrap();
    let response = app(state.clone()).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(matches!(recv(&mut socket).await, ServerMessage::Error { .. }));
    assert_eq!(state.presence.session_count().await, 0);
    assert!(state.store.get_user("carol").is_err());
}
