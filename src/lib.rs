//! Event manager: concurrent seat reservations served over a session protocol.
//!
//! The `EventStore` holds one `SeatGrid` per event. Clients connect through
//! a rendezvous endpoint, get a session id from the `SessionTable`, and then
//! exchange fixed-size frames with a `ProtocolEngine` worker dedicated to
//! their session.

pub mod client;
pub mod config;
pub mod config_parser;
pub mod domain;
pub mod engine;
pub mod error;
pub mod listener;
pub mod metrics;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod shutdown;
pub mod transport;

pub use client::*;
pub use self::config::*;
pub use config_parser::*;
pub use domain::*;
pub use engine::*;
pub use error::*;
pub use listener::*;
pub use metrics::*;
pub use session::*;
pub use shutdown::*;
