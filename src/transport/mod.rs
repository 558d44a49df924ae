//! Byte-stream endpoints the session protocol runs over.
//!
//! A client owns two named endpoints per session: one it writes requests
//! into and one it reads responses from. The server learns their names from
//! the connect handshake and opens the opposite ends.

#[cfg(unix)]
pub mod fifo;
pub mod memory;

#[cfg(unix)]
pub use fifo::*;
pub use memory::*;

use crate::{Result, SessionEndpoints};
use tokio::io::{AsyncRead, AsyncWrite};

/// Server side of a transport.
#[async_trait::async_trait]
pub trait ServerTransport: Send + Sync + 'static {
    type Reader: AsyncRead + Unpin + Send + 'static;
    type Writer: AsyncWrite + Unpin + Send + 'static;

    /// Opens the client's request endpoint for reading and its response
    /// endpoint for writing.
    async fn accept(&self, endpoints: &SessionEndpoints) -> Result<(Self::Reader, Self::Writer)>;
}

/// Client side of a transport.
#[async_trait::async_trait]
pub trait ClientTransport: Send + Sync {
    type Reader: AsyncRead + Unpin + Send;
    type Writer: AsyncWrite + Unpin + Send;

    /// Creates both endpoints and opens the client's ends of them:
    /// the request writer and the response reader.
    async fn create_endpoints(&self, endpoints: &SessionEndpoints) -> Result<(Self::Writer, Self::Reader)>;

    /// Delivers one encoded frame to the server's rendezvous endpoint.
    async fn send_to_server(&self, frame: &[u8]) -> Result<()>;

    /// Removes endpoints created by `create_endpoints`.
    async fn remove_endpoints(&self, endpoints: &SessionEndpoints) -> Result<()>;
}
