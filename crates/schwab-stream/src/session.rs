//! Streaming session client.
//!
//! [`StreamingSessionClient`] drives the protocol over any [`FrameSink`]:
//! it logs in with a token from the configured provider, subscribes to
//! account activity once the admin login succeeds, and hands each account
//! item to the registered callback. [`StreamingSession`] runs a client over a
//! live WebSocket.
//!
//! ```text
//! Disconnected ─connect→ Connecting ─open/login→ LoggingIn
//!   ─ADMIN code 0→ Subscribed ─account response/data→ Streaming ─logout→ Closed
//! ```

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::RwLock;
use schwab_auth::SharedTokenProvider;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::StreamError;
use crate::messages::{
    AccountContent, DataMessage, ProtocolMessage, ResponseMessage, Service, StreamRequest,
    StreamRequests,
};
use crate::preferences::{PreferenceSource, StreamerSessionInfo};
use crate::sequence::RequestSequenceCounter;
use crate::socket::{self, FrameSink, WsFrameSink, WsReader};

/// Called once per account activity item, in arrival order.
pub type AccountUpdateHandler = Arc<dyn Fn(AccountContent) + Send + Sync>;

/// Called with every error raised while handling an inbound frame.
pub type ErrorHandler = Arc<dyn Fn(&StreamError) + Send + Sync>;

/// Callbacks registered on a session.
#[derive(Clone)]
pub struct SessionHandlers {
    on_account_update: AccountUpdateHandler,
    on_error: Option<ErrorHandler>,
}

impl SessionHandlers {
    /// Handlers with an account-update callback and no error callback.
    pub fn new(on_account_update: impl Fn(AccountContent) + Send + Sync + 'static) -> Self {
        Self {
            on_account_update: Arc::new(on_account_update),
            on_error: None,
        }
    }

    /// Also report frame-handling errors to `on_error`.
    #[must_use]
    pub fn with_error_handler(
        mut self,
        on_error: impl Fn(&StreamError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(on_error));
        self
    }
}

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No socket.
    Disconnected,
    /// Socket opening.
    Connecting,
    /// Login frame sent, waiting for the admin response.
    LoggingIn,
    /// Account subscription sent.
    Subscribed,
    /// Account channel confirmed or delivering data.
    Streaming,
    /// Logged out.
    Closed,
}

/// Protocol state for one streaming session.
pub struct StreamingSessionClient {
    info: StreamerSessionInfo,
    provider: SharedTokenProvider,
    sink: Arc<dyn FrameSink>,
    counter: RequestSequenceCounter,
    send_lock: tokio::sync::Mutex<()>,
    state: RwLock<SessionState>,
    handlers: SessionHandlers,
}

impl StreamingSessionClient {
    /// Build a disconnected client writing frames to `sink`.
    pub fn new(
        info: StreamerSessionInfo,
        provider: SharedTokenProvider,
        sink: Arc<dyn FrameSink>,
        handlers: SessionHandlers,
    ) -> Self {
        Self {
            info,
            provider,
            sink,
            counter: RequestSequenceCounter::new(),
            send_lock: tokio::sync::Mutex::new(()),
            state: RwLock::new(SessionState::Disconnected),
            handlers,
        }
    }

    /// Session parameters.
    pub fn info(&self) -> &StreamerSessionInfo {
        &self.info
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Number of frames sent; also the id of the next frame.
    pub fn sent_requests(&self) -> u64 {
        self.counter.current()
    }

    fn set_state(&self, next: SessionState) {
        let previous = std::mem::replace(&mut *self.state.write(), next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "session state changed");
        }
    }

    /// Send the admin login frame. Called when the socket opens.
    pub async fn login(&self, cancel: &CancellationToken) -> Result<u64, StreamError> {
        let token = self.provider.get_access_token(cancel).await?;
        let id = self
            .send(|id| StreamRequest::admin_login(id, &self.info, &token))
            .await?;
        self.set_state(SessionState::LoggingIn);
        Ok(id)
    }

    /// Subscribe to account activity.
    pub async fn subscribe_account(&self) -> Result<u64, StreamError> {
        let id = self
            .send(|id| StreamRequest::account_subscribe(id, &self.info))
            .await?;
        self.set_state(SessionState::Subscribed);
        Ok(id)
    }

    /// Send the admin logout frame.
    pub async fn logout(&self) -> Result<u64, StreamError> {
        let id = self
            .send(|id| StreamRequest::admin_logout(id, &self.info))
            .await?;
        self.set_state(SessionState::Closed);
        info!(request_id = id, "logged out of stream");
        Ok(id)
    }

    /// Tag a request with the next id, write it, then advance the counter.
    async fn send(
        &self,
        build: impl FnOnce(u64) -> StreamRequest + Send,
    ) -> Result<u64, StreamError> {
        let _guard = self.send_lock.lock().await;
        let id = self.counter.current();
        let request = build(id);
        let text = StreamRequests::single(request.clone()).to_text()?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            if let Ok(masked) = StreamRequests::single(request.redacted()).to_text() {
                debug!(frame = %masked, "sending stream frame");
            }
        }

        self.sink.send_text(text).await?;
        let _ = self.counter.advance();
        Ok(id)
    }

    /// Classify one inbound frame and act on it.
    pub async fn handle_frame(&self, text: &str) -> Result<(), StreamError> {
        debug!(frame = text, "received stream frame");
        match ProtocolMessage::classify(text)? {
            ProtocolMessage::Notify(_) => Ok(()),
            ProtocolMessage::Response(message) => self.handle_responses(message).await,
            ProtocolMessage::Data(message) => self.handle_data(message),
        }
    }

    /// Handle a frame, reporting rather than returning any error.
    pub async fn process_frame(&self, text: &str) {
        if let Err(err) = self.handle_frame(text).await {
            self.report(&err);
        }
    }

    fn report(&self, err: &StreamError) {
        error!(error = %err, category = err.category(), "stream frame handling failed");
        if let Some(on_error) = &self.handlers.on_error {
            on_error(err);
        }
    }

    async fn handle_responses(&self, message: ResponseMessage) -> Result<(), StreamError> {
        for response in message.response {
            let code = response.content.code;
            match response.service {
                Service::Admin if code == 0 && response.command.as_deref() == Some("LOGOUT") => {
                    debug!("logout acknowledged");
                }
                Service::Admin if code == 0 => {
                    info!(message = %response.content.message, "stream login accepted");
                    let _ = self.subscribe_account().await?;
                }
                Service::Account => {
                    if code == 0 && self.state() == SessionState::Subscribed {
                        self.set_state(SessionState::Streaming);
                    }
                }
                service => {
                    return Err(StreamError::UnsupportedResponse {
                        service: service.to_string(),
                        code,
                        message: response.content.message,
                    });
                }
            }
        }
        Ok(())
    }

    fn handle_data(&self, message: DataMessage) -> Result<(), StreamError> {
        for data in message.data {
            if data.service != Service::Account {
                return Err(StreamError::UnsupportedService(data.service.to_string()));
            }
            if self.state() == SessionState::Subscribed {
                self.set_state(SessionState::Streaming);
            }
            for item in data.content {
                let content: AccountContent = serde_json::from_value(item)
                    .map_err(|e| StreamError::decode("account content", &e))?;
                (self.handlers.on_account_update)(content);
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Live session
// ─────────────────────────────────────────────────────────────────────────────

/// A client running over a live WebSocket.
pub struct StreamingSession {
    client: Arc<StreamingSessionClient>,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl StreamingSession {
    /// Look up session parameters, open the socket and log in.
    #[tracing::instrument(skip_all)]
    pub async fn connect(
        preferences: &dyn PreferenceSource,
        provider: SharedTokenProvider,
        handlers: SessionHandlers,
        cancel: &CancellationToken,
    ) -> Result<Self, StreamError> {
        let info = preferences.streamer_info(cancel).await?;
        let url = info.streamer_socket_url.clone();
        let (sink, queue) = WsFrameSink::channel();
        let client = Arc::new(StreamingSessionClient::new(
            info,
            provider,
            Arc::new(sink),
            handlers,
        ));

        client.set_state(SessionState::Connecting);
        let session_cancel = cancel.child_token();
        let connection = match socket::connect(&url, queue, &session_cancel).await {
            Ok(connection) => connection,
            Err(err) => {
                client.set_state(SessionState::Disconnected);
                return Err(err);
            }
        };

        let reader = tokio::spawn(read_loop(
            connection.reader,
            Arc::clone(&client),
            session_cancel.clone(),
        ));
        let session = Self {
            client,
            cancel: session_cancel,
            reader,
            writer: connection.writer,
        };

        if let Err(err) = session.client.login(&session.cancel).await {
            warn!(error = %err, "stream login failed");
            session.shutdown().await;
            return Err(err);
        }
        Ok(session)
    }

    /// The protocol client.
    pub fn client(&self) -> &Arc<StreamingSessionClient> {
        &self.client
    }

    /// Resolves once the connection has ended or been shut down.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Log out if logged in, close the socket and wait for both tasks.
    pub async fn shutdown(mut self) {
        let logged_in = matches!(
            self.client.state(),
            SessionState::LoggingIn | SessionState::Subscribed | SessionState::Streaming
        );
        if logged_in && !self.cancel.is_cancelled() {
            if let Err(err) = self.client.logout().await {
                warn!(error = %err, "logout failed during shutdown");
            }
        }

        self.cancel.cancel();
        if let Err(err) = (&mut self.writer).await {
            warn!(error = %err, "writer task failed");
        }
        if let Err(err) = (&mut self.reader).await {
            warn!(error = %err, "reader task failed");
        }
        self.client.set_state(SessionState::Closed);
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn read_loop(
    mut reader: WsReader,
    client: Arc<StreamingSessionClient>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = reader.next() => next,
        };
        match next {
            Some(Ok(Message::Text(text))) => client.process_frame(text.as_str()).await,
            Some(Ok(Message::Close(frame))) => {
                info!(?frame, "server closed stream");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                client.report(&StreamError::from(err));
                break;
            }
            None => break,
        }
    }

    if client.state() != SessionState::Closed {
        client.set_state(SessionState::Disconnected);
    }
    cancel.cancel();
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
