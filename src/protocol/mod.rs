//! Wire format of the session protocol.
//!
//! Every message is one fixed-size frame holding an operation code (or a
//! status code, for responses) followed by `|`-separated operands.

pub mod frame;
pub mod message;

pub use frame::*;
pub use message::*;
