use crate::protocol::{Failure, FrameCodec, Request, Response};
use crate::transport::ServerTransport;
use crate::{
    EmsError, EventStore, Metrics, Result, ServerConfig, SessionEndpoints, SessionId,
    SessionState, SessionTable,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// A connected client: its id and the server's ends of its two endpoints.
///
/// Dropping a session returns its id to the table, so a worker that dies
/// mid-request cannot keep the id allocated.
pub struct Session<T: ServerTransport> {
    id: SessionId,
    state: SessionState,
    reader: T::Reader,
    writer: T::Writer,
    sessions: Arc<SessionTable>,
}

impl<T: ServerTransport> Session<T> {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }
}

impl<T: ServerTransport> Drop for Session<T> {
    fn drop(&mut self) {
        // A closed session's id may already belong to someone else.
        if self.state != SessionState::Closed && self.sessions.release(self.id) {
            warn!(session_id = self.id, "Session dropped before it was closed");
        }
    }
}

/// Resolves once shutdown is requested. A dropped coordinator never asks.
pub(crate) async fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) {
    loop {
        match shutdown.recv().await {
            Ok(()) => return,
            Err(broadcast::error::RecvError::Lagged(_)) => return,
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

/// Runs the session protocol against the shared store.
pub struct ProtocolEngine<T: ServerTransport> {
    store: Arc<EventStore>,
    sessions: Arc<SessionTable>,
    transport: Arc<T>,
    codec: FrameCodec,
    metrics: Metrics,
}

impl<T: ServerTransport> ProtocolEngine<T> {
    pub fn new(
        store: Arc<EventStore>,
        sessions: Arc<SessionTable>,
        transport: Arc<T>,
        codec: FrameCodec,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            sessions,
            transport,
            codec,
            metrics,
        }
    }

    pub fn from_config(config: &ServerConfig, transport: Arc<T>) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            Arc::new(EventStore::new(config.access_delay())),
            Arc::new(SessionTable::new(config.max_sessions)),
            transport,
            FrameCodec::new(config.message_size),
            Metrics::new()?,
        ))
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.sessions
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn codec(&self) -> FrameCodec {
        self.codec
    }

    /// Handshake: allocates a session id (waiting while the pool is full),
    /// opens the client's endpoints and sends the id back.
    pub async fn connect(&self, endpoints: SessionEndpoints) -> Result<Session<T>> {
        let id = self.sessions.allocate(endpoints.clone()).await?;

        match self.open_session(id, &endpoints).await {
            Ok(session) => {
                self.metrics.update_active_sessions(self.sessions.active_count());
                info!(session_id = id, "Session active");
                Ok(session)
            }
            Err(e) => {
                self.sessions.release(id);
                Err(e)
            }
        }
    }

    async fn open_session(&self, id: SessionId, endpoints: &SessionEndpoints) -> Result<Session<T>> {
        let (reader, mut writer) = self.transport.accept(endpoints).await?;
        self.codec
            .write_frame(&mut writer, &Response::Connected(id).encode())
            .await?;

        Ok(Session {
            id,
            state: SessionState::Active,
            reader,
            writer,
            sessions: self.sessions.clone(),
        })
    }

    /// Serves requests until the client quits, its transport fails or
    /// shutdown is requested. The session id is released in every case.
    pub async fn serve(&self, mut session: Session<T>, mut shutdown: broadcast::Receiver<()>) {
        while session.state == SessionState::Active {
            let frame = tokio::select! {
                frame = self.codec.read_raw(&mut session.reader) => frame,
                _ = shutdown_requested(&mut shutdown) => {
                    info!(session_id = session.id, "Closing session for shutdown");
                    break;
                }
            };

            match frame {
                Ok(Some(bytes)) => {
                    if let Err(e) = self.serve_frame(&mut session, &bytes).await {
                        warn!(session_id = session.id, "Session transport failed: {}", e);
                        self.metrics.record_transport_failure();
                        break;
                    }
                }
                Ok(None) => {
                    info!(session_id = session.id, "Client closed its endpoint without quitting");
                    break;
                }
                Err(e) => {
                    warn!(session_id = session.id, "Session transport failed: {}", e);
                    self.metrics.record_transport_failure();
                    break;
                }
            }
        }

        self.close(&mut session);
    }

    async fn serve_frame(&self, session: &mut Session<T>, bytes: &[u8]) -> Result<()> {
        let request = self
            .codec
            .decode(bytes)
            .and_then(|text| Request::decode(&text));

        let response = match request {
            Ok(Request::Quit) => {
                self.metrics.record_request(true);
                debug!(session_id = session.id, "Quit received");
                session.state = SessionState::Closing;
                return Ok(());
            }
            Ok(request) => {
                self.metrics.record_request(true);
                debug!(session_id = session.id, "Request: {:?}", request.op_code());
                self.dispatch(request).await
            }
            Err(e) => {
                self.metrics.record_request(false);
                warn!(session_id = session.id, "Rejected malformed request: {}", e);
                Response::Failed(Failure::from(&e))
            }
        };

        self.send(&mut session.writer, &response).await
    }

    /// Executes one decoded request against the store.
    pub async fn dispatch(&self, request: Request) -> Response {
        let result = match request {
            Request::Create { event_id, rows, cols } => {
                self.store.create(event_id, rows, cols).await.map(|()| {
                    self.metrics.record_event_created();
                    Response::Created
                })
            }
            Request::Reserve { event_id, seats } => {
                let result = self.store.reserve(event_id, &seats).await;
                self.metrics.record_reservation_attempt(result.is_ok(), seats.len());
                result.map(|reservation_id| Response::Reserved { reservation_id })
            }
            Request::Show { event_id } => self.store.show(event_id).await.map(Response::Grid),
            Request::List => Ok(Response::Events(self.store.list().await)),
            Request::Connect(_) => Err(EmsError::InvalidRequest(
                "Session is already connected".to_string(),
            )),
            Request::Quit => Err(EmsError::InvalidRequest(
                "Quit must be sent on a session".to_string(),
            )),
        };

        result.unwrap_or_else(|e| {
            debug!("Request failed: {}", e);
            Response::Failed(Failure::from(&e))
        })
    }

    async fn send(&self, writer: &mut T::Writer, response: &Response) -> Result<()> {
        let mut text = response.encode();
        if text.len() > self.codec.size() {
            warn!(
                "Response of {} bytes exceeds frame size {}",
                text.len(),
                self.codec.size()
            );
            text = Response::Failed(Failure::InvalidRequest(format!(
                "Response of {} bytes exceeds frame size {}",
                text.len(),
                self.codec.size()
            )))
            .encode();
        }
        self.codec.write_frame(writer, &text).await
    }

    fn close(&self, session: &mut Session<T>) {
        session.state = SessionState::Closing;
        self.sessions.release(session.id);
        session.state = SessionState::Closed;
        self.metrics.update_active_sessions(self.sessions.active_count());
    }
}
