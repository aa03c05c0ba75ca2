//! An in-process stand-in for the project server.
//!
//! One listener serves both sides of the API, like the real server: requests
//! for `/socket/...` are upgraded to WebSockets and handed to the test, every
//! other request is answered by a route closure.

#![allow(dead_code)]

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use verdant_collab::ChannelEvent;

pub type Socket = WebSocketStream<TcpStream>;
type Routes = Arc<dyn Fn(&str, &str) -> (u16, String) + Send + Sync>;

pub const WAIT: Duration = Duration::from_secs(3);

pub struct FakeServer {
    pub port: u16,
    pub sockets: mpsc::UnboundedReceiver<Socket>,
    /// `"METHOD /path"` for every plain HTTP request, in arrival order.
    pub requests: mpsc::UnboundedReceiver<String>,
}

impl FakeServer {
    /// Serve on an ephemeral port. `routes(method, path)` returns the status
    /// code and JSON body of each HTTP response.
    pub async fn start(
        routes: impl Fn(&str, &str) -> (u16, String) + Send + Sync + 'static,
    ) -> Self {
        Self::spawn(Arc::new(routes), true).await
    }

    /// Like [`FakeServer::start`], but socket handshakes get a plain 404.
    pub async fn without_sockets(
        routes: impl Fn(&str, &str) -> (u16, String) + Send + Sync + 'static,
    ) -> Self {
        Self::spawn(Arc::new(routes), false).await
    }

    async fn spawn(routes: Routes, upgrade: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (sockets_tx, sockets) = mpsc::unbounded_channel();
        let (requests_tx, requests) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = routes.clone();
                let sockets_tx = sockets_tx.clone();
                let requests_tx = requests_tx.clone();
                tokio::spawn(async move {
                    let mut head = [0u8; 64];
                    let Ok(n) = stream.peek(&mut head).await else {
                        return;
                    };
                    if upgrade && head[..n].starts_with(b"GET /socket/") {
                        if let Ok(socket) = tokio_tungstenite::accept_async(stream).await {
                            let _ = sockets_tx.send(socket);
                        }
                    } else {
                        answer(stream, routes, requests_tx).await;
                    }
                });
            }
        });

        Self {
            port,
            sockets,
            requests,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn socket_url(&self, project: i64) -> url::Url {
        url::Url::parse(&format!("ws://127.0.0.1:{}/socket/projects/{project}", self.port))
            .unwrap()
    }

    pub async fn accept(&mut self) -> Socket {
        timeout(WAIT, self.sockets.recv())
            .await
            .expect("no socket connection")
            .expect("server stopped")
    }
}

async fn answer(stream: TcpStream, routes: Routes, requests: mpsc::UnboundedSender<String>) {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.is_err() {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = vec![0u8; content_length];
    let _ = reader.read_exact(&mut body).await;

    let _ = requests.send(format!("{method} {path}"));
    let (status, payload) = routes(&method, &path);
    let response = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        reason(status),
        payload.len()
    );
    let mut stream = reader.into_inner();
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}

pub async fn push(socket: &mut Socket, text: &str) {
    socket.send(Message::text(text.to_string())).await.unwrap();
}

/// The next frame the client sent, skipping pings and pongs.
pub async fn next_frame(socket: &mut Socket) -> Option<Message> {
    loop {
        match timeout(WAIT, socket.next()).await.ok()?? {
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(message) => return Some(message),
            Err(_) => return None,
        }
    }
}

pub async fn next_event(events: &mut mpsc::Receiver<ChannelEvent>) -> ChannelEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("no channel event in time")
        .expect("event stream ended")
}

/// `true` when nothing arrives within `window`.
pub async fn quiet(events: &mut mpsc::Receiver<ChannelEvent>, window: Duration) -> bool {
    timeout(window, events.recv()).await.is_err()
}
