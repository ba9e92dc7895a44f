//! WebSocket plumbing over `tokio-tungstenite`.
//!
//! A [`WsFrameSink`] can be handed out before the socket exists; frames queue
//! until [`connect`] starts the writer task, which owns the write half and
//! acknowledges each frame once written. The read half goes back to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::StreamError;

/// Connected socket type.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Read half handed back by [`connect`].
pub type WsReader = SplitStream<WsStream>;

/// Somewhere text frames can be written.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Write one frame. Returns once the frame has been handed to the socket.
    async fn send_text(&self, text: String) -> Result<(), StreamError>;
}

#[async_trait]
impl<T: FrameSink + ?Sized> FrameSink for Arc<T> {
    async fn send_text(&self, text: String) -> Result<(), StreamError> {
        (**self).send_text(text).await
    }
}

/// Frame queued for the writer task.
struct Outbound {
    text: String,
    ack: oneshot::Sender<Result<(), StreamError>>,
}

/// Handle to the writer task of a connection.
#[derive(Clone)]
pub struct WsFrameSink {
    tx: mpsc::Sender<Outbound>,
}

/// Frames waiting for the writer task.
pub struct OutboundQueue(mpsc::Receiver<Outbound>);

impl WsFrameSink {
    /// A sink and the queue its frames land in.
    pub fn channel() -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::channel(64);
        (Self { tx }, OutboundQueue(rx))
    }
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send_text(&self, text: String) -> Result<(), StreamError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Outbound { text, ack })
            .await
            .map_err(|_| StreamError::Closed)?;
        done.await.map_err(|_| StreamError::Closed)?
    }
}

/// A freshly opened connection.
#[derive(Debug)]
pub struct Connection {
    /// Read half.
    pub reader: WsReader,
    /// Writer task; exits when `cancel` fires or a write fails.
    pub writer: JoinHandle<()>,
}

/// Open a WebSocket to `url` and start writing frames from `queue`.
#[tracing::instrument(skip(queue, cancel))]
pub async fn connect(
    url: &str,
    queue: OutboundQueue,
    cancel: &CancellationToken,
) -> Result<Connection, StreamError> {
    let (ws, _) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(StreamError::Cancelled),
        result = connect_async(url) => result?,
    };
    info!("websocket connected");

    let (ws_tx, reader) = ws.split();
    let writer = tokio::spawn(write_loop(ws_tx, queue.0, cancel.clone()));

    Ok(Connection { reader, writer })
}

async fn write_loop(
    mut ws_tx: SplitSink<WsStream, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = rx.recv() => {
                let Some(out) = next else { break };
                let result = ws_tx
                    .send(Message::Text(out.text.into()))
                    .await
                    .map_err(StreamError::from);
                let failed = result.is_err();
                if let Err(err) = &result {
                    warn!(error = %err, "websocket write failed");
                }
                let _ = out.ack.send(result);
                if failed {
                    break;
                }
            }
        }
    }

    if let Err(err) = ws_tx.close().await {
        debug!(error = %err, "websocket close");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;

    #[tokio::test]
    async fn frames_are_written_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let mut received = Vec::new();
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Text(text) => received.push(text.as_str().to_string()),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            received
        });

        let cancel = CancellationToken::new();
        let (sink, queue) = WsFrameSink::channel();
        let conn = connect(&format!("ws://{addr}"), queue, &cancel).await.unwrap();
        sink.send_text("one".into()).await.unwrap();
        sink.send_text("two".into()).await.unwrap();
        cancel.cancel();
        conn.writer.await.unwrap();

        assert_eq!(server.await.unwrap(), vec!["one", "two"]);
        assert_matches!(sink.send_text("late".into()).await, Err(StreamError::Closed));
    }

    #[tokio::test]
    async fn cancelled_connect() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (_sink, queue) = WsFrameSink::channel();
        let result = connect("ws://127.0.0.1:9", queue, &cancel).await;
        assert_matches!(result, Err(StreamError::Cancelled));
    }
}
