use crate::{EmsError, EventStore, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Duration;
use tracing::{info, warn, error};

/// Graceful shutdown coordinator
#[derive(Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    components: Arc<Mutex<Vec<Box<dyn ShutdownComponent + Send + Sync>>>>,
    shutdown_timeout: Duration,
}

/// Trait for components that need graceful shutdown
#[async_trait::async_trait]
pub trait ShutdownComponent {
    async fn shutdown(&self) -> Result<()>;
    fn name(&self) -> &str;
}

impl ShutdownCoordinator {
    pub fn new(shutdown_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shutdown_tx,
            components: Arc::new(Mutex::new(Vec::new())),
            shutdown_timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Register a component for graceful shutdown
    pub async fn register_component(&self, component: Box<dyn ShutdownComponent + Send + Sync>) {
        let mut components = self.components.lock().await;
        info!("Registering component '{}' for graceful shutdown", component.name());
        components.push(component);
    }

    /// Get a shutdown signal receiver
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Tell every subscriber to stop. Safe to call more than once.
    pub fn trigger(&self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("Shutdown signal had no subscribers");
        }
    }

    /// Shut down registered components in registration order
    pub async fn shutdown(&self) -> Result<()> {
        info!("Initiating graceful shutdown...");
        self.trigger();

        let components = self.components.lock().await;
        let shutdown_all = async {
            let mut failed = 0;
            for component in components.iter() {
                info!("Shutting down component '{}'", component.name());
                match component.shutdown().await {
                    Ok(()) => info!("Component '{}' shutdown successfully", component.name()),
                    Err(e) => {
                        error!("Component '{}' shutdown failed: {}", component.name(), e);
                        failed += 1;
                    }
                }
            }
            failed
        };

        match tokio::time::timeout(self.shutdown_timeout, shutdown_all).await {
            Ok(0) => {
                info!("All components shutdown successfully");
                Ok(())
            }
            Ok(failed) => Err(EmsError::InvalidArgument(format!(
                "{} component(s) failed to shut down",
                failed
            ))),
            Err(_) => {
                error!("Shutdown timeout exceeded, forcing exit");
                Err(EmsError::InvalidArgument(
                    "Shutdown timeout exceeded".to_string()
                ))
            }
        }
    }
}

/// Event store teardown component
pub struct EventStoreShutdown {
    store: Arc<EventStore>,
}

impl EventStoreShutdown {
    pub fn new(store: Arc<EventStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl ShutdownComponent for EventStoreShutdown {
    async fn shutdown(&self) -> Result<()> {
        self.store.terminate().await;
        Ok(())
    }

    fn name(&self) -> &str {
        "event-store"
    }
}

/// Removes the server's rendezvous pipe
#[cfg(unix)]
pub struct RendezvousShutdown {
    path: PathBuf,
}

#[cfg(unix)]
impl RendezvousShutdown {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[cfg(unix)]
#[async_trait::async_trait]
impl ShutdownComponent for RendezvousShutdown {
    async fn shutdown(&self) -> Result<()> {
        crate::transport::remove_fifo(&self.path)
    }

    fn name(&self) -> &str {
        "rendezvous-pipe"
    }
}

/// Resolves when the process receives SIGINT or SIGTERM
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                warn!("Failed to install signal handlers, falling back to Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, initiating graceful shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_notifies_subscribers_and_tears_down_store() {
        let store = Arc::new(EventStore::without_delay());
        store.create(1, 1, 1).await.unwrap();

        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        coordinator
            .register_component(Box::new(EventStoreShutdown::new(store.clone())))
            .await;
        let mut rx = coordinator.subscribe();

        coordinator.shutdown().await.unwrap();

        assert!(rx.recv().await.is_ok());
        assert!(store.is_empty().await);
    }

    struct Failing;

    #[async_trait::async_trait]
    impl ShutdownComponent for Failing {
        async fn shutdown(&self) -> Result<()> {
            Err(EmsError::InvalidArgument("boom".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn failed_component_is_reported() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        coordinator.register_component(Box::new(Failing)).await;
        assert!(coordinator.shutdown().await.is_err());
    }
}
