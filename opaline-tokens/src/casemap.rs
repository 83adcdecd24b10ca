//! IRC case folding.
//!
//! Servers advertise their casemapping in RPL_ISUPPORT.  Under the common `rfc1459` mapping the
//! characters `[`, `]`, `\` and `~` are the uppercase forms of `{`, `}`, `|` and `^`, because of
//! how modes were stored on some historic servers.  Nicknames, channel names and masks must be
//! folded with the right mapping before they are compared or used as map keys.

use std::fmt;

/// A server's case folding rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Casemapping {
    /// Only `A-Z` fold to `a-z`.
    Ascii,

    /// ASCII plus `[]\~` folding to `{}|^`.
    Rfc1459,

    /// ASCII plus `[]\` folding to `{}|`, without the `~` pair.
    Rfc1459Strict,
}

impl Default for Casemapping {
    fn default() -> Self {
        Casemapping::Rfc1459
    }
}

impl fmt::Display for Casemapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascii => write!(f, "ascii"),
            Self::Rfc1459 => write!(f, "rfc1459"),
            Self::Rfc1459Strict => write!(f, "rfc1459-strict"),
        }
    }
}

impl Casemapping {
    /// Parses the value of the `CASEMAPPING` ISUPPORT token.
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("ascii") {
            Some(Self::Ascii)
        } else if value.eq_ignore_ascii_case("rfc1459") {
            Some(Self::Rfc1459)
        } else if value.eq_ignore_ascii_case("rfc1459-strict")
            || value.eq_ignore_ascii_case("strict-rfc1459")
        {
            Some(Self::Rfc1459Strict)
        } else {
            None
        }
    }

    /// The lowercase form of one character under this mapping.
    pub fn lower_char(self, c: char) -> char {
        match c {
            'A'..='Z' => c.to_ascii_lowercase(),
            '[' if self != Self::Ascii => '{',
            ']' if self != Self::Ascii => '}',
            '\\' if self != Self::Ascii => '|',
            '~' if self == Self::Rfc1459 => '^',
            c => c,
        }
    }

    /// Folds a string to its canonical lowercase form.
    ///
    /// Apply this before every map insert or lookup so that ordinary `String`-keyed maps compare
    /// names the way the server does.
    pub fn lower(self, s: &str) -> String {
        s.chars().map(|c| self.lower_char(c)).collect()
    }

    /// Compares two strings under this mapping without allocating.
    pub fn eq(self, a: &str, b: &str) -> bool {
        let mut a = a.chars();
        let mut b = b.chars();
        loop {
            match (a.next(), b.next()) {
                (Some(ca), Some(cb)) => {
                    if self.lower_char(ca) != self.lower_char(cb) {
                        return false;
                    }
                }
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc1459_fold() {
        let cm = Casemapping::Rfc1459;
        assert_eq!(cm.lower("Nick[away]~"), "nick{away}^");
        assert!(cm.eq("foo\\bar", "FOO|BAR"));
        assert!(cm.eq("#Chan[1]", "#chan{1}"));
        assert!(!cm.eq("abc", "abcd"));
    }

    #[test]
    fn test_ascii_fold() {
        let cm = Casemapping::Ascii;
        assert_eq!(cm.lower("Nick[A]"), "nick[a]");
        assert!(!cm.eq("a[", "a{"));
    }

    #[test]
    fn test_strict_keeps_tilde() {
        let cm = Casemapping::Rfc1459Strict;
        assert_eq!(cm.lower("a~["), "a~{");
    }

    #[test]
    fn test_parse() {
        assert_eq!(Casemapping::parse("ascii"), Some(Casemapping::Ascii));
        assert_eq!(Casemapping::parse("RFC1459"), Some(Casemapping::Rfc1459));
        assert_eq!(Casemapping::parse("utf8"), None);
    }
}
