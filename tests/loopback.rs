//! End-to-end checks of `Connection` over a real loopback WebSocket server.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use carelink::{ChatUpdate, Connection, ConnectionConfig, ConnectionError, ConnectionState, StepProgress};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::LocalSet;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Chat backend stand-in: greets each client with a step notice, answers
/// every `{"message": ..}` with a chat update, and drops the first
/// `drop_first` connections right after the handshake.
async fn spawn_backend(drop_first: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let index = counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.expect("server handshake");
                if index < drop_first {
                    ws.close(None).await.expect("server close");
                    return;
                }
                let step = json!({"type": "step", "step": 1, "description": "loading profile"});
                ws.send(Message::text(step.to_string())).await.expect("send step");

                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(text) = msg else {
                        continue;
                    };
                    let inbound: Value = serde_json::from_str(text.as_str()).expect("client json");
                    let reply = json!({
                        "conversation_id": "conv-1",
                        "history": [
                            {"role": "user", "content": inbound["message"]},
                            {"role": "assistant", "content": "Noted.", "steps": 1, "id": "m-2"}
                        ]
                    });
                    ws.send(Message::text(reply.to_string())).await.expect("send reply");
                }
            });
        }
    });

    (format!("ws://{addr}/ws"), accepted)
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !cond() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

#[tokio::test]
async fn exchanges_frames_with_backend() {
    let (endpoint, _) = spawn_backend(0).await;

    LocalSet::new()
        .run_until(async move {
            let conn = Connection::new(ConnectionConfig::new(endpoint));
            let steps: Rc<RefCell<Vec<StepProgress>>> = Rc::default();
            let updates: Rc<RefCell<Vec<ChatUpdate>>> = Rc::default();
            let s = Rc::clone(&steps);
            conn.on_step(move |step| s.borrow_mut().push(step));
            let u = Rc::clone(&updates);
            conn.on_message(move |update| u.borrow_mut().push(update));

            conn.connect();
            wait_until("open", || conn.is_open()).await;
            wait_until("step notice", || !steps.borrow().is_empty()).await;
            assert_eq!(steps.borrow()[0].description, "loading profile");

            conn.send_message("I slept six hours");
            wait_until("chat update", || !updates.borrow().is_empty()).await;

            let update = updates.borrow()[0].clone();
            assert_eq!(update.conversation_id(), Some("conv-1"));
            let history = update.history().expect("history");
            assert_eq!(history[0].content, "I slept six hours");
            assert_eq!(history[1].role, "assistant");
            assert_eq!(history[1].steps, Some(1));

            conn.disconnect();
            assert_eq!(conn.state(), ConnectionState::Closed);
        })
        .await;
}

#[tokio::test]
async fn reconnects_after_server_drop() {
    let (endpoint, accepted) = spawn_backend(1).await;

    LocalSet::new()
        .run_until(async move {
            let config = ConnectionConfig::new(endpoint).with_reconnect_delay(Duration::from_millis(20));
            let conn = Connection::new(config);
            let steps = Rc::new(RefCell::new(0usize));
            let s = Rc::clone(&steps);
            conn.on_step(move |_| *s.borrow_mut() += 1);

            conn.connect();
            wait_until("step after reconnect", || *steps.borrow() > 0).await;

            assert!(accepted.load(Ordering::SeqCst) >= 2);
            assert!(conn.is_open());
            assert_eq!(conn.reconnect_attempts(), 0);
            conn.disconnect();
        })
        .await;
}

#[tokio::test]
async fn unreachable_endpoint_reports_transport_errors_then_gives_up() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    LocalSet::new()
        .run_until(async move {
            let config = ConnectionConfig::new(format!("ws://{addr}/ws"))
                .with_max_reconnect_attempts(2)
                .with_reconnect_delay(Duration::from_millis(10));
            let conn = Connection::new(config);
            let errors: Rc<RefCell<Vec<ConnectionError>>> = Rc::default();
            let e = Rc::clone(&errors);
            conn.on_error(move |error| e.borrow_mut().push(error));

            conn.connect();
            wait_until("three failed handshakes", || errors.borrow().len() >= 3).await;
            sleep(Duration::from_millis(100)).await;

            let errors = errors.borrow();
            assert_eq!(errors.len(), 3, "initial attempt plus two retries");
            assert!(errors.iter().all(|e| e.to_string() == "WebSocket connection error"));
            assert_eq!(conn.state(), ConnectionState::Closed);
            assert_eq!(conn.reconnect_attempts(), 2);
        })
        .await;
}
