use crate::engine::shutdown_requested;
use crate::protocol::Request;
use crate::transport::ServerTransport;
use crate::{ProtocolEngine, Result, ShutdownCoordinator};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Accepts connect requests on the rendezvous endpoint and runs one worker
/// task per session.
pub struct Listener<T: ServerTransport> {
    engine: Arc<ProtocolEngine<T>>,
    shutdown: ShutdownCoordinator,
    workers: JoinSet<()>,
}

impl<T: ServerTransport> Listener<T> {
    pub fn new(engine: Arc<ProtocolEngine<T>>, shutdown: ShutdownCoordinator) -> Self {
        Self {
            engine,
            shutdown,
            workers: JoinSet::new(),
        }
    }

    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    /// Runs until shutdown is requested or the rendezvous endpoint closes.
    pub async fn run<R>(&mut self, mut rendezvous: R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let codec = self.engine.codec();
        let mut shutdown = self.shutdown.subscribe();

        // A connect waiting for a free slot is woken by closing the table.
        let sessions = self.engine.sessions().clone();
        let mut close_on_shutdown = self.shutdown.subscribe();
        let closer = tokio::spawn(async move {
            shutdown_requested(&mut close_on_shutdown).await;
            sessions.close();
        });

        info!("Listening for connections");
        let result = loop {
            self.reap_workers();

            let frame = tokio::select! {
                frame = codec.read_raw(&mut rendezvous) => frame,
                _ = shutdown_requested(&mut shutdown) => break Ok(()),
            };

            let bytes = match frame {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    info!("Rendezvous endpoint closed");
                    break Ok(());
                }
                Err(e) => {
                    error!("Rendezvous endpoint failed: {}", e);
                    break Err(e);
                }
            };

            let endpoints = match codec.decode(&bytes).and_then(|text| Request::decode(&text)) {
                Ok(Request::Connect(endpoints)) => endpoints,
                Ok(other) => {
                    warn!("Ignoring {:?} request on the rendezvous endpoint", other.op_code());
                    continue;
                }
                Err(e) => {
                    warn!("Ignoring malformed connect request: {}", e);
                    continue;
                }
            };

            match self.engine.connect(endpoints).await {
                Ok(session) => {
                    let engine = self.engine.clone();
                    let worker_shutdown = self.shutdown.subscribe();
                    self.workers.spawn(async move {
                        engine.serve(session, worker_shutdown).await;
                    });
                }
                Err(e) => warn!("Failed to connect client: {}", e),
            }
        };

        closer.abort();
        self.engine.sessions().close();
        result
    }

    fn reap_workers(&mut self) {
        while let Some(joined) = self.workers.try_join_next() {
            if let Err(e) = joined {
                error!("Session worker failed: {}", e);
            }
        }
    }

    /// Waits for running workers, aborting any still running after `timeout`.
    pub async fn drain(&mut self, timeout: Duration) {
        let workers = &mut self.workers;
        let finished = tokio::time::timeout(timeout, async {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    error!("Session worker failed: {}", e);
                }
            }
        })
        .await;

        if finished.is_err() {
            warn!("Aborting {} session worker(s) after {:?}", self.workers.len(), timeout);
            self.workers.abort_all();
        }
    }
}
