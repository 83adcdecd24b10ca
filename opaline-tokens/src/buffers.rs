use crate::Command;
use std::fmt;

/// The recommended length of a message.
///
/// Used by `Buffer` to avoid multiple allocations when building the same message.
pub const MESSAGE_LENGTH: usize = 512;

/// Helper to build an IRC message.
///
/// Use with `Buffer::message`.
pub struct MessageBuffer<'a> {
    buf: &'a mut String,
}

impl<'a> MessageBuffer<'a> {
    fn with_prefix(buf: &'a mut String, prefix: &str, command: Command) -> Self {
        use fmt::Write as _;

        if !prefix.is_empty() {
            buf.push(':');
            buf.push_str(prefix);
            buf.push(' ');
        }
        let _ = write!(buf, "{}", command);
        MessageBuffer { buf }
    }

    /// Appends a parameter to the message.
    ///
    /// The parameter is trimmed before insertion.  If `param` is whitespace, it is not appended.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use opaline_tokens::{Buffer, Command};
    /// let mut out = Buffer::new();
    ///
    /// out.message("", Command::Mode)
    ///     .param("#chan")
    ///     .param("")
    ///     .param("  +b ");
    ///
    /// assert_eq!(out.build(), "MODE #chan +b\r\n");
    /// ```
    pub fn param(self, param: &str) -> Self {
        let param = param.trim();
        if param.is_empty() {
            return self;
        }
        self.buf.push(' ');
        self.buf.push_str(param);
        self
    }

    /// Appends the trailing parameter to the message and consumes the buffer.
    ///
    /// Contrary to `MessageBuffer::param`, the parameter is not trimmed before insertion.  Even if
    /// `param` is just whitespace, it is appended.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use opaline_tokens::{Buffer, Command};
    /// let mut out = Buffer::new();
    ///
    /// out.message("", Command::Kick)
    ///     .param("#chan")
    ///     .param("joe")
    ///     .trailing_param("be nice");
    ///
    /// assert_eq!(out.build(), "KICK #chan joe :be nice\r\n");
    /// ```
    pub fn trailing_param(self, param: &str) {
        self.buf.push(' ');
        self.buf.push(':');
        self.buf.push_str(param);
    }

    /// Returns a buffer the caller can use to append characters to an IRC message.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use opaline_tokens::{Buffer, Command};
    /// let mut out = Buffer::new();
    /// {
    ///     let mut msg = out.message("", Command::Mode).param("#chan");
    ///     let param = msg.raw_param();
    ///     param.push('+');
    ///     param.push('b');
    ///     param.push('b');
    /// }
    ///
    /// assert_eq!(out.build(), "MODE #chan +bb\r\n");
    /// ```
    pub fn raw_param(&mut self) -> &mut String {
        self.buf.push(' ');
        self.buf
    }
}

impl Drop for MessageBuffer<'_> {
    /// Append "\r\n" when the `MessageBuffer` is dropped.
    fn drop(&mut self) {
        self.buf.push('\r');
        self.buf.push('\n');
    }
}

/// Helper to build one or several IRC messages.
#[derive(Debug)]
pub struct Buffer {
    buf: String,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    /// Creates a `Buffer`.  Does not allocate.
    pub fn new() -> Self {
        Self { buf: String::new() }
    }

    /// Whether the buffer is empty.  The buffer may be empty even if `message` was called.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends an IRC message with a prefix to the buffer.  Pass an empty prefix for
    /// client-to-server commands.
    pub fn message(&mut self, prefix: &str, command: Command) -> MessageBuffer<'_> {
        if self.buf.is_empty() {
            self.buf.reserve(MESSAGE_LENGTH);
        }
        MessageBuffer::with_prefix(&mut self.buf, prefix, command)
    }

    /// Consumes the buffer and returns the built messages.
    pub fn build(self) -> String {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpl;

    #[test]
    fn test_numeric_reply() {
        let mut out = Buffer::new();
        out.message("hub.example", Command::Reply(rpl::BANLIST))
            .param("me")
            .param("#chan")
            .param("*!*@joe.example")
            .param("oper")
            .param("1234");
        assert_eq!(
            out.build(),
            ":hub.example 367 me #chan *!*@joe.example oper 1234\r\n"
        );
    }

    #[test]
    fn test_several_messages() {
        let mut out = Buffer::new();
        out.message("", Command::Mode).param("#chan").param("+b");
        out.message("", Command::Who).param("#chan");
        assert_eq!(out.build(), "MODE #chan +b\r\nWHO #chan\r\n");
    }
}
