use clap::Parser;
use event_manager::{parse_properties_file, Result, ServerConfig};
use std::path::PathBuf;
use tracing::info;

mod service;

use service::EmsService;

#[derive(Parser, Debug)]
#[command(name = "ems-server")]
#[command(about = "Event management server")]
struct Args {
    /// Path of the rendezvous pipe clients connect through
    server_pipe: Option<PathBuf>,

    /// Artificial delay before every event lookup, in microseconds
    delay_us: Option<u64>,

    /// Config file path
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Maximum number of concurrent sessions
    #[arg(long = "max-sessions")]
    max_sessions: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting Event Management Server");

    let config = load_config(args)?;
    info!("Server pipe: {:?}", config.server_pipe);
    info!("State access delay: {:?}", config.access_delay());
    info!("Max sessions: {}", config.max_sessions);

    let service = EmsService::new(config).await?;
    service.run().await?;

    Ok(())
}

fn load_config(args: Args) -> Result<ServerConfig> {
    // Properties file first, then environment, then command line
    let config = match &args.config {
        Some(path) => {
            info!("Loading config from: {:?}", path);
            parse_properties_file(path)?
        }
        None => ServerConfig::default(),
    };
    let mut config = config.with_env_overrides()?;

    if let Some(server_pipe) = args.server_pipe {
        config.server_pipe = server_pipe;
    }
    if let Some(delay_us) = args.delay_us {
        config.access_delay_us = delay_us;
    }
    if let Some(max_sessions) = args.max_sessions {
        config.max_sessions = max_sessions;
    }

    config.validate()?;
    Ok(config)
}
