use super::{ClientTransport, ServerTransport};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::{EmsError, Result, SessionEndpoints};
use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::net::unix::pipe::{OpenOptions, Receiver, Sender};
use tracing::{debug, warn};

fn transport_error(action: &str, path: &Path, e: io::Error) -> EmsError {
    EmsError::TransportFailure(format!("{} {:?}: {}", action, path, e))
}

/// Creates a named pipe at `path`, replacing whatever stale file is there.
pub fn make_fifo(path: &Path) -> Result<()> {
    remove_fifo(path)?;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| EmsError::InvalidArgument(format!("Path contains a NUL byte: {:?}", path)))?;

    // SAFETY: c_path is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o666 as libc::mode_t) };
    if rc != 0 {
        return Err(EmsError::Io(io::Error::last_os_error()));
    }

    debug!("Created fifo {:?}", path);
    Ok(())
}

/// Unlinks `path`. A missing file is not an error.
pub fn remove_fifo(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EmsError::Io(e)),
    }
}

/// Opens an end we also hold a writer on, so reads never report EOF
/// while the other side is not yet (or no longer) connected.
fn keepalive_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    #[cfg(target_os = "linux")]
    options.read_write(true);
    options
}

/// Creates the server's rendezvous pipe and opens it for reading.
pub fn open_rendezvous(path: &Path) -> Result<Receiver> {
    make_fifo(path)?;
    keepalive_options()
        .open_receiver(path)
        .map_err(|e| transport_error("open rendezvous", path, e))
}

/// Named-pipe transport.
#[derive(Debug, Clone)]
pub struct FifoTransport {
    server_pipe: PathBuf,
    retry: RetryConfig,
}

impl FifoTransport {
    pub fn new(server_pipe: impl Into<PathBuf>) -> Self {
        Self {
            server_pipe: server_pipe.into(),
            retry: RetryConfig::server_pipe(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn server_pipe(&self) -> &Path {
        &self.server_pipe
    }
}

#[async_trait::async_trait]
impl ServerTransport for FifoTransport {
    type Reader = Receiver;
    type Writer = Sender;

    async fn accept(&self, endpoints: &SessionEndpoints) -> Result<(Receiver, Sender)> {
        // The client keeps both pipes open before connecting, so neither
        // open below can miss its peer.
        let reader = OpenOptions::new()
            .open_receiver(&endpoints.request)
            .map_err(|e| transport_error("open request endpoint", &endpoints.request, e))?;
        let writer = OpenOptions::new()
            .open_sender(&endpoints.response)
            .map_err(|e| transport_error("open response endpoint", &endpoints.response, e))?;
        Ok((reader, writer))
    }
}

#[async_trait::async_trait]
impl ClientTransport for FifoTransport {
    type Reader = Receiver;
    type Writer = Sender;

    async fn create_endpoints(&self, endpoints: &SessionEndpoints) -> Result<(Sender, Receiver)> {
        make_fifo(&endpoints.request)?;
        make_fifo(&endpoints.response)?;

        let writer = keepalive_options()
            .open_sender(&endpoints.request)
            .map_err(|e| transport_error("open request endpoint", &endpoints.request, e))?;
        let reader = keepalive_options()
            .open_receiver(&endpoints.response)
            .map_err(|e| transport_error("open response endpoint", &endpoints.response, e))?;
        Ok((writer, reader))
    }

    async fn send_to_server(&self, frame: &[u8]) -> Result<()> {
        let path = self.server_pipe.clone();
        let mut server = retry_with_backoff(&self.retry, "open server pipe", || {
            let path = path.clone();
            async move {
                OpenOptions::new()
                    .open_sender(&path)
                    .map_err(|e| transport_error("open server pipe", &path, e))
            }
        })
        .await?;

        server
            .write_all(frame)
            .await
            .map_err(|e| transport_error("write to server pipe", &self.server_pipe, e))?;
        Ok(())
    }

    async fn remove_endpoints(&self, endpoints: &SessionEndpoints) -> Result<()> {
        for path in [&endpoints.request, &endpoints.response] {
            if let Err(e) = remove_fifo(path) {
                warn!("Failed to remove {:?}: {}", path, e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::FileTypeExt;
    use tempfile::tempdir;

    #[test]
    fn make_fifo_replaces_stale_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipe");
        std::fs::write(&path, b"stale").unwrap();

        make_fifo(&path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().file_type().is_fifo());

        remove_fifo(&path).unwrap();
        assert!(!path.exists());
        remove_fifo(&path).unwrap();
    }
}
