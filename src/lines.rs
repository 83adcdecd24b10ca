//! User-visible text.
//!
//! The tracking core never prints anything itself; these strings travel in `Event`s and error
//! displays so the embedding client can show them in whatever buffer it likes.

pub const OP_TIMEOUT: &str = "Gave up waiting for operator status, dropping queued commands";
pub const QUEUE_OVERFLOW: &str = "Too many queued commands, clearing the whole queue";
pub const UNSUPPORTED_MODE: &str = "This channel mode is not supported by the server";
pub const CONNECTION_RESET: &str = "Connection lost, discarding partial mask list";
pub const NOT_AN_OPERATOR: &str = "The server says we lack operator status";
pub const MALFORMED_LINE: &str = "Received a mask list line that could not be parsed";
pub const NO_SUCH_USER: &str = "No hostmask known for this nick";
