use event_manager::transport::{open_rendezvous, FifoTransport};
use event_manager::{
    wait_for_signal, EventStoreShutdown, Listener, ProtocolEngine, RendezvousShutdown, Result,
    ServerConfig, ShutdownCoordinator,
};
use std::sync::Arc;
use tracing::{error, info};

pub struct EmsService {
    config: ServerConfig,
    engine: Arc<ProtocolEngine<FifoTransport>>,
    shutdown: ShutdownCoordinator,
}

impl EmsService {
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let transport = Arc::new(FifoTransport::new(&config.server_pipe));
        let engine = Arc::new(ProtocolEngine::from_config(&config, transport)?);

        let shutdown = ShutdownCoordinator::new(config.shutdown_timeout());
        shutdown
            .register_component(Box::new(EventStoreShutdown::new(engine.store().clone())))
            .await;
        shutdown
            .register_component(Box::new(RendezvousShutdown::new(&config.server_pipe)))
            .await;

        Ok(Self {
            config,
            engine,
            shutdown,
        })
    }

    pub async fn run(&self) -> Result<()> {
        let rendezvous = open_rendezvous(&self.config.server_pipe)?;
        let mut listener = Listener::new(self.engine.clone(), self.shutdown.clone());

        // Handle shutdown signal
        let signals = {
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                wait_for_signal().await;
                shutdown.trigger();
            })
        };

        info!("Event Management Server is running...");
        let result = listener.run(rendezvous).await;
        signals.abort();

        info!("Event Management Server shutting down...");
        listener.drain(self.shutdown.timeout()).await;
        if let Err(e) = self.shutdown.shutdown().await {
            error!("Graceful shutdown failed: {}", e);
        }

        match self.engine.metrics().export() {
            Ok(metrics) => info!("Final metrics:\n{}", metrics),
            Err(e) => error!("Failed to export metrics: {}", e),
        }

        result
    }
}
