use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmsError {
    #[error("Event already exists: {0}")]
    AlreadyExists(u32),

    #[error("Event not found: {0}")]
    NotFound(u32),

    #[error("Seat out of bounds: row {row}, col {col}")]
    OutOfBounds { row: usize, col: usize },

    #[error("Seat already reserved: row {row}, col {col}")]
    AlreadyReserved { row: usize, col: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Session pool exhausted")]
    PoolExhausted,

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Wire status codes carried in the first field of every non-connect response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 0,
    AlreadyExists = 1,
    NotFound = 2,
    OutOfBounds = 3,
    AlreadyReserved = 4,
    InvalidRequest = 5,
}

impl StatusCode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::AlreadyExists),
            2 => Some(Self::NotFound),
            3 => Some(Self::OutOfBounds),
            4 => Some(Self::AlreadyReserved),
            5 => Some(Self::InvalidRequest),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl EmsError {
    /// Errors that end the session instead of being answered in-band.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, EmsError::TransportFailure(_) | EmsError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, EmsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_fatal() {
        assert!(EmsError::TransportFailure("closed".into()).is_session_fatal());
        assert!(!EmsError::InvalidRequest("bad".into()).is_session_fatal());
        assert!(!EmsError::NotFound(3).is_session_fatal());
    }

    #[test]
    fn status_codes_round_trip() {
        for code in 0..=5 {
            assert_eq!(StatusCode::from_code(code).unwrap().code(), code);
        }
        assert_eq!(StatusCode::from_code(9), None);
    }
}
