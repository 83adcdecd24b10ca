use std::fmt;

macro_rules! commands {
    ( $( $cmd:ident $cmd_str:literal $n:literal )* ) => {
        /// The list of commands the tracking core inspects.
        ///
        /// Numeric replies are carried by the `Reply` variant; any other command the server may
        /// send is reported as unknown by `Message` directly.
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum Command {
            $( $cmd, )*
            Reply(u16),
        }

        impl Command {
            /// From a given command string, returns the corresponding command, or `None`
            /// otherwise.
            ///
            /// It ignores the case of its argument.  Three-digit words parse into the `Reply`
            /// variant.
            ///
            /// # Example
            ///
            /// ```rust
            /// # use opaline_tokens::Command;
            /// assert_eq!(Command::parse("mode"), Some(Command::Mode));
            /// assert_eq!(Command::parse("MODE"), Some(Command::Mode));
            /// assert_eq!(Command::parse("367"), Some(Command::Reply(367)));
            /// assert_eq!(Command::parse("not_mode"), None);
            /// ```
            pub fn parse(s: &str) -> Option<Self> {
                $( if s.eq_ignore_ascii_case($cmd_str) {
                    Some(Command::$cmd)
                } else )* if s.len() == 3 && s.bytes().all(|b| b.is_ascii_digit()) {
                    s.parse().ok().map(Command::Reply)
                } else {
                    None
                }
            }

            /// Returns the number of required arguments for the command.
            ///
            /// The command may accept more arguments.
            pub fn required_params(&self) -> usize {
                match self {
                $(
                    Command::$cmd => $n,
                )*
                    Command::Reply(_) => 0,
                }
            }
        }

        impl fmt::Display for Command {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                $(
                    Command::$cmd => f.write_str($cmd_str),
                )*
                    Command::Reply(num) => write!(f, "{:03}", num),
                }
            }
        }
    }
}

commands! {
//  Ident.   String     Minimum # of params
    Join     "JOIN"     1
    Kick     "KICK"     2
    Mode     "MODE"     1
    Nick     "NICK"     1
    Notice   "NOTICE"   2
    Part     "PART"     1
    Ping     "PING"     1
    Pong     "PONG"     1
    PrivMsg  "PRIVMSG"  2
    Quit     "QUIT"     0
    Who      "WHO"      0
}
