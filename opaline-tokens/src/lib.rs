//! Tokenize the subset of IRC that a channel-operator helper cares about.
//!
//! This library provides helpers to split inbound server lines into messages, walk MODE queries
//! against the server's advertised channel-mode set, and build outbound commands, while keeping
//! the number of allocations minimal.

#![forbid(unsafe_code)]
#![warn(clippy::all, rust_2018_idioms)]

pub use buffers::{Buffer, MessageBuffer, MESSAGE_LENGTH};
pub use casemap::Casemapping;
pub use command::Command;
pub use isupport::Isupport;
pub use message::{Hostmask, Message, PARAMS_LENGTH};
pub use mode::ChanModes;

mod buffers;
pub mod casemap;
mod command;
mod isupport;
mod message;
pub mod mode;
pub mod rpl;

/// Assert all data of a message.
///
/// Empty elements in `params` will not be asserted with their equivalent in `msg.params`, but will
/// still count for the assertion of the number of parameters.
pub fn assert_msg(
    msg: &Message<'_>,
    prefix: Option<&str>,
    command: Result<Command, &str>,
    params: &[&str],
) {
    assert_eq!(msg.prefix, prefix, "prefix of {:?}", msg);
    assert_eq!(msg.command, command, "command of {:?}", msg);
    assert_eq!(
        msg.num_params,
        params.len(),
        "number of parameters of {:?}",
        msg
    );
    for (i, (actual, expected)) in msg.params.iter().zip(params.iter()).enumerate() {
        if expected.is_empty() {
            continue;
        }
        assert_eq!(actual, expected, "parameter #{} of {:?}", i, msg);
    }
}
