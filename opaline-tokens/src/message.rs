use crate::Command;

/// The number of elements in `Message::params`.
pub const PARAMS_LENGTH: usize = 15;

/// Returns `(word, rest)` where `word` is the first word of the given string and `rest` is the
/// substring starting at the first character of the second word.
///
/// Word boundaries here are spaces only.
fn parse_word(s: &str) -> (&str, &str) {
    let mut split = s.splitn(2, ' ').map(str::trim).filter(|s| !s.is_empty());
    (split.next().unwrap_or(""), split.next().unwrap_or(""))
}

/// If the given string starts with a prefix, returns `(Some(prefix), rest)` where `rest` starts
/// from the first word after the prefix.
///
/// Otherwise returns `(None, rest)` where `rest` is the substring starting from the first word of
/// the given string.
fn parse_prefix(buf: &str) -> (Option<&str>, &str) {
    if buf.starts_with(':') {
        let (prefix, rest) = parse_word(buf);
        (Some(&prefix[1..]), rest)
    } else {
        (None, buf.trim_start())
    }
}

/// Parses the first word of the string the same way as `parse_word`, and then tries to parse it as
/// a command.
///
/// On success, it returns `(Ok(command), rest)`.  On failure, when the command is not a variant of
/// `Command`, it returns `(Err(unknown_command), rest)`.
fn parse_command(buf: &str) -> (Result<Command, &str>, &str) {
    let (command_string, rest) = parse_word(buf);
    (Command::parse(command_string).ok_or(command_string), rest)
}

/// The sender of a message, split into its `nick!user@host` parts.
///
/// Servers use a bare server name as prefix for most numerics; those do not parse as a
/// `Hostmask`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hostmask<'a> {
    pub nick: &'a str,
    pub user: &'a str,
    pub host: &'a str,
}

impl<'a> Hostmask<'a> {
    /// Splits a full `nick!user@host` string.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use opaline_tokens::Hostmask;
    /// let whole = Hostmask::parse("aurora!~aura@borealis.example").unwrap();
    ///
    /// assert_eq!(whole.nick, "aurora");
    /// assert_eq!(whole.user, "~aura");
    /// assert_eq!(whole.host, "borealis.example");
    /// assert_eq!(Hostmask::parse("hub.example"), None);
    /// ```
    pub fn parse(prefix: &'a str) -> Option<Self> {
        let bang = prefix.find('!')?;
        let at = prefix[bang..].find('@')? + bang;
        if bang == 0 || at == bang + 1 || at + 1 == prefix.len() {
            return None;
        }
        Some(Hostmask {
            nick: &prefix[..bang],
            user: &prefix[bang + 1..at],
            host: &prefix[at + 1..],
        })
    }

    /// The same mask with the nick part replaced, as an owned string.
    ///
    /// Used when a user changes their nickname: the user and host parts stay valid.
    pub fn with_nick(&self, nick: &str) -> String {
        format!("{}!{}@{}", nick, self.user, self.host)
    }
}

/// An IRC message.
///
/// See `Message::parse` for documentation on how to read IRC messages, and `Buffer` for
/// how to create messages.
#[derive(Clone, Debug)]
pub struct Message<'a> {
    /// The prefix, the sender of the message.
    pub prefix: Option<&'a str>,

    /// The command of the message, or the command string when it is not known.
    pub command: Result<Command, &'a str>,

    /// The number of parameters of the message.
    pub num_params: usize,

    /// The parameters of the message.  Only the first `num_params` elements are meaningful.
    pub params: [&'a str; PARAMS_LENGTH],
}

impl<'a> Message<'a> {
    /// Parses a string and returns information about the IRC message.
    ///
    /// Returns `None` when the message is empty or has no command.  IRCv3 message tags are
    /// accepted and skipped, since the tracking core has no use for them.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use opaline_tokens::{Command, Message};
    /// let line = ":irc.example 367 me #chan *!*@spam.example setter 1234";
    /// let msg = Message::parse(line).unwrap();
    ///
    /// assert_eq!(msg.prefix, Some("irc.example"));
    /// assert_eq!(msg.command, Ok(Command::Reply(367)));
    /// assert_eq!(msg.num_params, 6);
    /// assert_eq!(msg.params[2], "*!*@spam.example");
    /// ```
    pub fn parse(s: &'a str) -> Option<Message<'a>> {
        let buf = s.trim();
        if buf.is_empty() {
            return None;
        }
        let buf = if buf.starts_with('@') {
            parse_word(buf).1
        } else {
            buf
        };
        let (prefix, rest) = parse_prefix(buf);
        let (command, mut rest) = parse_command(rest);
        if let Err("") = command {
            return None;
        }

        let mut params = [""; PARAMS_LENGTH];
        let mut num_params = 0;
        while num_params < PARAMS_LENGTH {
            if rest.is_empty() {
                break;
            }
            if rest.starts_with(':') {
                params[num_params] = &rest[1..];
                rest = "";
            } else {
                let (word, r) = parse_word(rest);
                params[num_params] = word;
                rest = r;
            }
            num_params += 1;
        }

        Some(Message {
            prefix,
            command,
            num_params,
            params,
        })
    }

    /// The hostmask of the sender, when the prefix is a full `nick!user@host`.
    pub fn hostmask(&self) -> Option<Hostmask<'a>> {
        self.prefix.and_then(Hostmask::parse)
    }

    /// The nick part of the prefix, or the whole prefix when it has no `!`.
    pub fn prefix_nick(&self) -> Option<&'a str> {
        let prefix = self.prefix?;
        Some(prefix.split('!').next().unwrap_or(prefix))
    }

    /// Returns true when the message has enough parameters for its command.
    pub fn has_enough_params(&self) -> bool {
        match self.command {
            Ok(cmd) => cmd.required_params() <= self.num_params,
            Err(_) => false,
        }
    }
}
