use crate::{EmsError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Separator between the fields of a frame.
pub const FIELD_SEPARATOR: char = '|';

/// Fixed-size framing: every message occupies exactly `size` bytes of
/// UTF-8 text padded with NUL bytes. Writes of a whole frame to a pipe are
/// atomic as long as `size` does not exceed the platform's PIPE_BUF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    size: usize,
}

impl FrameCodec {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        if text.contains('\0') {
            return Err(EmsError::InvalidRequest(
                "Message contains a NUL byte".to_string(),
            ));
        }
        if text.len() > self.size {
            return Err(EmsError::InvalidRequest(format!(
                "Message of {} bytes exceeds frame size {}",
                text.len(),
                self.size
            )));
        }

        let mut frame = vec![0u8; self.size];
        frame[..text.len()].copy_from_slice(text.as_bytes());
        Ok(frame)
    }

    pub fn decode(&self, frame: &[u8]) -> Result<String> {
        let end = frame.iter().position(|&b| b == 0).unwrap_or(frame.len());
        String::from_utf8(frame[..end].to_vec())
            .map_err(|_| EmsError::InvalidRequest("Message is not valid UTF-8".to_string()))
    }

    /// Reads one whole frame. `Ok(None)` means the peer closed the endpoint
    /// between frames; closing in the middle of one is a transport failure.
    pub async fn read_raw<R>(&self, reader: &mut R) -> Result<Option<Vec<u8>>>
    where
        R: AsyncRead + Unpin,
    {
        let mut frame = vec![0u8; self.size];
        let mut filled = 0;

        while filled < self.size {
            let n = reader
                .read(&mut frame[filled..])
                .await
                .map_err(|e| EmsError::TransportFailure(format!("read failed: {}", e)))?;

            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(EmsError::TransportFailure(format!(
                    "endpoint closed after {} of {} bytes",
                    filled, self.size
                )));
            }
            filled += n;
        }

        Ok(Some(frame))
    }

    pub async fn write_frame<W>(&self, writer: &mut W, text: &str) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = self.encode(text)?;
        writer
            .write_all(&frame)
            .await
            .map_err(|e| EmsError::TransportFailure(format!("write failed: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| EmsError::TransportFailure(format!("flush failed: {}", e)))?;
        Ok(())
    }
}

/// Cursor over the `|`-separated fields of a decoded frame.
pub struct Fields<'a> {
    parts: std::str::Split<'a, char>,
}

impl<'a> Fields<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            parts: text.split(FIELD_SEPARATOR),
        }
    }

    pub fn next_str(&mut self, name: &str) -> Result<&'a str> {
        self.parts
            .next()
            .ok_or_else(|| EmsError::InvalidRequest(format!("Missing field: {}", name)))
    }

    pub fn next_number<T: std::str::FromStr>(&mut self, name: &str) -> Result<T> {
        let raw = self.next_str(name)?;
        raw.trim()
            .parse()
            .map_err(|_| EmsError::InvalidRequest(format!("Invalid {}: {:?}", name, raw)))
    }

    /// Everything after the fields consumed so far, separators included.
    pub fn rest(self) -> String {
        self.parts.collect::<Vec<_>>().join("|")
    }

    pub fn finish(mut self) -> Result<()> {
        match self.parts.next() {
            None => Ok(()),
            Some(extra) => Err(EmsError::InvalidRequest(format!(
                "Unexpected trailing field: {:?}",
                extra
            ))),
        }
    }
}
