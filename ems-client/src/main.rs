use anyhow::{Context, Result};
use clap::Parser;
use event_manager::protocol::FrameCodec;
use event_manager::transport::FifoTransport;
use event_manager::{EmsClient, EmsError, GridView, SessionEndpoints};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

mod parser;

use parser::{parse_command, Command, HELP};

#[derive(Parser, Debug)]
#[command(name = "ems-client")]
#[command(about = "Runs event management commands against a server")]
struct Args {
    /// Pipe this client sends requests through
    request_pipe: PathBuf,

    /// Pipe this client reads responses from
    response_pipe: PathBuf,

    /// Rendezvous pipe of the server
    server_pipe: PathBuf,

    /// Commands file; standard input when omitted
    commands: Option<PathBuf>,

    /// Frame size shared with the server
    #[arg(long = "message-size", default_value_t = 4096)]
    message_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let transport = Arc::new(FifoTransport::new(&args.server_pipe));
    let endpoints = SessionEndpoints::new(&args.request_pipe, &args.response_pipe);
    let mut client = EmsClient::setup(transport, endpoints, FrameCodec::new(args.message_size))
        .await
        .context("Failed to connect to the server")?;

    let result = match &args.commands {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {:?}", path))?;
            run_commands(&mut client, BufReader::new(file)).await
        }
        None => run_commands(&mut client, BufReader::new(tokio::io::stdin())).await,
    };

    client.quit().await.context("Failed to disconnect")?;
    result
}

async fn run_commands<R>(client: &mut EmsClient<FifoTransport>, input: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(_) => {
                eprintln!("Invalid command. See HELP for usage");
                continue;
            }
        };

        let outcome = match command {
            Command::Create { event_id, rows, cols } => client.create(event_id, rows, cols).await,
            Command::Reserve { event_id, seats } => {
                client.reserve(event_id, &seats).await.map(|reservation_id| {
                    info!(event_id, reservation_id, "Reserved {} seats", seats.len());
                })
            }
            Command::Show { event_id } => client.show(event_id).await.map(|view| print_grid(&view)),
            Command::List => client.list().await.map(|ids| print_events(&ids)),
            Command::Wait(delay) => {
                info!("Waiting {:?}", delay);
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Command::Help => {
                print!("{}", HELP);
                Ok(())
            }
            Command::Empty => Ok(()),
        };

        match outcome {
            Ok(()) => {}
            Err(e) if e.is_session_fatal() => return Err(e).context("Lost the session"),
            Err(e) => report(&e),
        }
    }

    Ok(())
}

fn report(error: &EmsError) {
    warn!("Request failed: {}", error);
    eprintln!("{}", error);
}

fn print_grid(view: &GridView) {
    for row in &view.seats {
        let line = row.iter().map(u32::to_string).collect::<Vec<_>>().join(" ");
        println!("{}", line);
    }
}

fn print_events(ids: &[u32]) {
    if ids.is_empty() {
        println!("No events");
        return;
    }
    for id in ids {
        println!("Event: {}", id);
    }
}
