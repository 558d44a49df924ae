use super::{ClientTransport, ServerTransport};
use crate::{EmsError, Result, SessionEndpoints};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;

struct PendingEndpoints {
    response: PathBuf,
    server_reader: DuplexStream,
    server_writer: DuplexStream,
}

/// In-process transport over `tokio::io::duplex` streams.
///
/// Endpoints are registered under their request path by the client and
/// claimed by the server on connect.
pub struct MemoryTransport {
    pending: DashMap<PathBuf, PendingEndpoints>,
    rendezvous: Mutex<DuplexStream>,
    buffer_size: usize,
}

impl MemoryTransport {
    /// Returns the transport and the server's end of the rendezvous stream.
    pub fn new(buffer_size: usize) -> (Arc<Self>, DuplexStream) {
        let (client_side, server_side) = tokio::io::duplex(buffer_size);
        let transport = Arc::new(Self {
            pending: DashMap::new(),
            rendezvous: Mutex::new(client_side),
            buffer_size,
        });
        (transport, server_side)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait::async_trait]
impl ServerTransport for MemoryTransport {
    type Reader = DuplexStream;
    type Writer = DuplexStream;

    async fn accept(&self, endpoints: &SessionEndpoints) -> Result<(DuplexStream, DuplexStream)> {
        let (_, pending) = self.pending.remove(&endpoints.request).ok_or_else(|| {
            EmsError::TransportFailure(format!("No endpoint at {:?}", endpoints.request))
        })?;

        if pending.response != endpoints.response {
            return Err(EmsError::TransportFailure(format!(
                "No endpoint at {:?}",
                endpoints.response
            )));
        }
        Ok((pending.server_reader, pending.server_writer))
    }
}

#[async_trait::async_trait]
impl ClientTransport for MemoryTransport {
    type Reader = DuplexStream;
    type Writer = DuplexStream;

    async fn create_endpoints(&self, endpoints: &SessionEndpoints) -> Result<(DuplexStream, DuplexStream)> {
        let (client_writer, server_reader) = tokio::io::duplex(self.buffer_size);
        let (server_writer, client_reader) = tokio::io::duplex(self.buffer_size);

        self.pending.insert(
            endpoints.request.clone(),
            PendingEndpoints {
                response: endpoints.response.clone(),
                server_reader,
                server_writer,
            },
        );
        Ok((client_writer, client_reader))
    }

    async fn send_to_server(&self, frame: &[u8]) -> Result<()> {
        let mut rendezvous = self.rendezvous.lock().await;
        rendezvous
            .write_all(frame)
            .await
            .map_err(|e| EmsError::TransportFailure(format!("rendezvous write failed: {}", e)))
    }

    async fn remove_endpoints(&self, endpoints: &SessionEndpoints) -> Result<()> {
        self.pending.remove(&endpoints.request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn server_claims_client_endpoints() {
        let (transport, _rendezvous) = MemoryTransport::new(64);
        let endpoints = SessionEndpoints::new("req", "resp");

        let (mut client_writer, mut client_reader) = transport.create_endpoints(&endpoints).await.unwrap();
        let (mut server_reader, mut server_writer) = transport.accept(&endpoints).await.unwrap();
        assert_eq!(transport.pending_count(), 0);

        client_writer.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server_reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server_writer.write_all(b"pong").await.unwrap();
        client_reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn unknown_endpoints_fail() {
        let (transport, _rendezvous) = MemoryTransport::new(64);
        let result = transport.accept(&SessionEndpoints::new("nope", "nada")).await;
        assert!(matches!(result, Err(EmsError::TransportFailure(_))));
    }
}
