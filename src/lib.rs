//! opaline, a channel-operator toolkit for IRC clients.
//!
//! The crate keeps a client-side mirror of channel ban/quiet state and sequences privileged
//! operations on top of it:
//!
//! - [`mask::MaskCache`] mirrors the server's ban/quiet lists, queryable by nick, hostmask or
//!   glob pattern;
//! - [`sync::SyncEngine`] drives the mode-list protocol exchange that refreshes the mirror;
//! - [`presence::PresenceCache`] resolves nicknames to hostmasks, tolerating recent departures;
//! - [`queue::CommandQueue`] paces outgoing operator actions behind an op-status grant;
//! - [`Tracker`] ties the four together and is what an embedding client talks to.
//!
//! The embedding client owns the connection: it feeds inbound lines to
//! [`Tracker::handle_message`], sends whatever appears on the per-network outbound queue, and
//! calls [`Tracker::tick`] about once a second (or lets [`Tracker::start_ticking`] spawn a task
//! that does).

#![forbid(unsafe_code)]
#![warn(clippy::all, rust_2018_idioms)]

pub use crate::config::Settings;
pub use crate::state::{Event, MessageQueue, Tracker};

use std::fmt;

pub mod config;
mod lines;
pub mod mask;
pub mod presence;
pub mod queue;
pub mod sync;
mod state;
mod util;

/// The ways the core fails.
///
/// Parsing problems are handled where they occur (log and skip); these are the failures that
/// abort an operation and must reach the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The requested mode letter is not in the server's advertised set.
    ProtocolMismatch { mode: char },

    /// The connection dropped while a fetch was in flight.
    ConnectionReset,

    /// Operator status was not granted within the configured window.
    OpGrantTimeout { channel: String },

    /// More commands were queued than the safety limit allows.
    QueueOverflow { dropped: usize },

    /// An inbound line for a tracked command had too few parameters.
    MalformedLine,

    /// The server rejected a command with ERR_CHANOPRIVSNEEDED.
    NotOperator { channel: String },

    /// A nickname could not be resolved to a hostmask.
    NoSuchUser { nick: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolMismatch { mode } => {
                write!(f, "{} (+{})", lines::UNSUPPORTED_MODE, mode)
            }
            Self::ConnectionReset => f.write_str(lines::CONNECTION_RESET),
            Self::OpGrantTimeout { channel } => {
                write!(f, "{} ({})", lines::OP_TIMEOUT, channel)
            }
            Self::QueueOverflow { dropped } => {
                write!(f, "{} ({} dropped)", lines::QUEUE_OVERFLOW, dropped)
            }
            Self::MalformedLine => f.write_str(lines::MALFORMED_LINE),
            Self::NotOperator { channel } => {
                write!(f, "{} ({})", lines::NOT_AN_OPERATOR, channel)
            }
            Self::NoSuchUser { nick } => {
                write!(f, "{} ({})", lines::NO_SUCH_USER, nick)
            }
        }
    }
}

impl std::error::Error for Error {}

/// Alias to std's Result using this crate's Error.
pub type Result<T> = std::result::Result<T, Error>;
