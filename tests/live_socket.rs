use futures::{ SinkExt, StreamExt };
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::{ accept_async, tungstenite::protocol::Message };
use wayfarer_chat::connection::{ ConnectionManager, ConnectionState, ManagerConfig };
use wayfarer_chat::models::chat::{ ChatSnapshot, Origin };
use wayfarer_chat::websocket::TungsteniteConnector;

/// Accepts one client and answers every text frame the way the travel backend does.
async fn spawn_assistant() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut websocket = accept_async(stream).await.unwrap();
        while let Some(Ok(message)) = websocket.next().await {
            if let Message::Text(text) = message {
                let reply = if text == "raw please" {
                    "plain reply".to_string()
                } else {
                    serde_json::json!({ "response": format!("Trip ideas for: {}", text) }).to_string()
                };
                if websocket.send(Message::Text(reply)).await.is_err() {
                    break;
                }
            }
        }
    });
    format!("ws://{}", addr)
}

async fn wait_for(
    rx: &mut tokio::sync::watch::Receiver<ChatSnapshot>,
    predicate: impl FnMut(&ChatSnapshot) -> bool
) -> ChatSnapshot {
    timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("timed out")
        .expect("manager stopped")
        .clone()
}

#[tokio::test]
async fn chats_with_a_real_websocket_server() {
    let endpoint = spawn_assistant().await;
    let config = ManagerConfig {
        endpoint,
        retry_delay: Duration::from_millis(50),
        ..ManagerConfig::default()
    };
    let handle = ConnectionManager::spawn(config, Arc::new(TungsteniteConnector));
    let mut rx = handle.subscribe();

    handle.submit("plan a trip").await.unwrap();
    assert!(handle.snapshot().connected);

    let snapshot = wait_for(&mut rx, |s| !s.pending).await;
    let replies: Vec<(Origin, &str)> = snapshot.messages
        .iter()
        .map(|m| (m.origin(), m.content()))
        .collect();
    assert_eq!(replies, vec![
        (Origin::User, "plan a trip"),
        (Origin::Remote, "Trip ideas for: plan a trip"),
    ]);

    handle.submit("raw please").await.unwrap();
    let snapshot = wait_for(&mut rx, |s| s.messages.len() == 4 && !s.pending).await;
    assert_eq!(snapshot.messages[3].content(), "plain reply");

    handle.teardown().await;
    assert_eq!(handle.snapshot().state, ConnectionState::Idle);
}

#[tokio::test]
async fn unreachable_server_ends_in_terminal_failure() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ManagerConfig {
        endpoint: format!("ws://{}", addr),
        max_attempts: 2,
        retry_delay: Duration::from_millis(20),
        ..ManagerConfig::default()
    };
    let handle = ConnectionManager::spawn(config, Arc::new(TungsteniteConnector));
    let mut rx = handle.subscribe();

    let snapshot = wait_for(&mut rx, |s| s.state == ConnectionState::Idle && !s.messages.is_empty()).await;
    assert_eq!(snapshot.retry_attempts, 2);
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].origin(), Origin::Remote);
    handle.teardown().await;
}
