#![allow(dead_code)]

use binance_streams::StreamError;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, WebSocketStream};

pub type PeerSocket = WebSocketStream<TcpStream>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Accepts a single WebSocket connection and hands it to `behavior`.
pub async fn spawn_peer<F, Fut>(behavior: F) -> String
where
    F: FnOnce(PeerSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = accept_async(tcp).await.unwrap();
        behavior(ws).await;
    });

    format!("ws://{}/ws", addr)
}

/// Answers every upgrade request with `403 Forbidden`.
pub async fn spawn_rejecting_peer() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut tcp, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = tcp.read(&mut buf).await;
            let _ = tcp
                .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
            let _ = tcp.shutdown().await;
        }
    });

    format!("ws://{}/ws", addr)
}

/// A URL nothing listens on.
pub async fn unused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}/ws", addr)
}

/// Keeps reading (which answers pings) until the client goes away.
pub async fn drain(mut ws: PeerSocket) {
    use futures_util::StreamExt;
    while let Some(Ok(_)) = ws.next().await {}
}

/// Records everything a session reports.
#[derive(Clone, Default)]
pub struct Recorder {
    messages: Arc<Mutex<Vec<Vec<u8>>>>,
    errors: Arc<Mutex<Vec<StreamError>>>,
}

impl Recorder {
    pub fn on_message(&self) -> impl FnMut(Vec<u8>) + Send + 'static {
        let messages = Arc::clone(&self.messages);
        move |payload| messages.lock().unwrap().push(payload)
    }

    pub fn on_error(&self) -> impl FnOnce(StreamError) + Send + 'static {
        let errors = Arc::clone(&self.errors);
        move |error| errors.lock().unwrap().push(error)
    }

    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.messages.lock().unwrap().clone()
    }

    pub fn text_messages(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .map(|m| String::from_utf8(m).unwrap())
            .collect()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }

    pub fn first_error<T>(&self, inspect: impl FnOnce(&StreamError) -> T) -> Option<T> {
        self.errors.lock().unwrap().first().map(inspect)
    }
}

pub async fn wait_until(mut condition: impl FnMut() -> bool, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
