//! Mode parsing driven by the server's advertised channel-mode set.
//!
//! Unlike a server, a client cannot hardcode which mode letters take an argument: the authority
//! is the `CHANMODES` and `PREFIX` tokens of RPL_ISUPPORT.  `channel_query` walks a mode string
//! and consumes positional arguments according to those categories.

use std::str;

/// Iterator over the modes of a string.
struct SimpleQuery<'a> {
    modes: str::Chars<'a>,
    value: bool,
}

impl<'a> SimpleQuery<'a> {
    pub fn new(modes: &'a str) -> Self {
        Self {
            modes: modes.chars(),
            value: true,
        }
    }
}

impl Iterator for SimpleQuery<'_> {
    type Item = (bool, char);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let c = self.modes.next()?;
            match c {
                '+' => {
                    self.value = true;
                }
                '-' => {
                    self.value = false;
                }
                c => {
                    return Some((self.value, c));
                }
            }
        }
    }
}

/// *_query related errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// One of the modes in the query is not advertised by the server.
    Unknown(char, bool),

    /// A mode is missing its required parameter.
    MissingParam(char, bool),
}

/// Alias to std's Result using this module's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// The channel-mode categories a server advertises.
///
/// Categories follow the `CHANMODES=A,B,C,D` ISUPPORT token: type A modes manage lists of masks,
/// type B always take a parameter, type C take one only when set, type D never do.  Membership
/// modes (`PREFIX=(ov)@+`) behave like type B.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChanModes {
    pub list: String,
    pub always_param: String,
    pub set_param: String,
    pub simple: String,
    pub membership: String,
}

impl Default for ChanModes {
    /// The RFC 2811 baseline, assumed until the server says otherwise.
    fn default() -> Self {
        Self {
            list: "beI".to_owned(),
            always_param: "k".to_owned(),
            set_param: "l".to_owned(),
            simple: "imnst".to_owned(),
            membership: "ov".to_owned(),
        }
    }
}

impl ChanModes {
    /// Parses the value of a `CHANMODES` token, e.g. `beIq,k,l,imnst`.
    pub fn parse(value: &str) -> Option<Self> {
        let mut split = value.split(',');
        let list = split.next()?.to_owned();
        let always_param = split.next()?.to_owned();
        let set_param = split.next()?.to_owned();
        let simple = split.next()?.to_owned();
        Some(Self {
            list,
            always_param,
            set_param,
            simple,
            membership: ChanModes::default().membership,
        })
    }

    /// Replaces the membership letters with those of a `PREFIX` token, e.g. `(qaohv)~&@%+`.
    pub fn set_prefix(&mut self, value: &str) {
        if let Some(end) = value.find(')') {
            if value.starts_with('(') {
                self.membership = value[1..end].to_owned();
            }
        }
    }

    /// Whether the letter manages a list of masks (type A).
    pub fn is_list(&self, mode: char) -> bool {
        self.list.contains(mode)
    }

    /// Whether the letter grants a membership rank (PREFIX).
    pub fn is_membership(&self, mode: char) -> bool {
        self.membership.contains(mode)
    }

    fn is_known(&self, mode: char) -> bool {
        self.list.contains(mode)
            || self.always_param.contains(mode)
            || self.set_param.contains(mode)
            || self.simple.contains(mode)
            || self.membership.contains(mode)
    }

    fn takes_param(&self, mode: char, value: bool) -> bool {
        self.list.contains(mode)
            || self.always_param.contains(mode)
            || self.membership.contains(mode)
            || (value && self.set_param.contains(mode))
    }
}

/// Item of a channel mode query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeChange<'a> {
    /// Whether the mode is being set or unset.
    pub value: bool,

    /// The mode letter.
    pub letter: char,

    /// The positional argument consumed by this change, if the letter takes one.
    pub param: Option<&'a str>,
}

/// An iterator over the changes of a MODE query, argument consumption ruled by `chanmodes`.
///
/// List modes queried without an argument (e.g. `MODE #chan +b`) are *not* reported as missing a
/// parameter: they are a request for the server's list and yield `param: None`.
///
/// # Example
///
/// ```rust
/// # use opaline_tokens::mode::{self, ChanModes, Error, ModeChange};
/// let cm = ChanModes::default();
/// let mut query = mode::channel_query(&cm, "+bo-X", &["*!*@joe.example", "joe"]);
///
/// assert_eq!(query.next(), Some(Ok(ModeChange { value: true, letter: 'b', param: Some("*!*@joe.example") })));
/// assert_eq!(query.next(), Some(Ok(ModeChange { value: true, letter: 'o', param: Some("joe") })));
/// assert_eq!(query.next(), Some(Err(Error::Unknown('X', false))));
/// assert_eq!(query.next(), None);
/// ```
pub fn channel_query<'a>(
    chanmodes: &'a ChanModes,
    modes: &'a str,
    params: &'a [&'a str],
) -> impl Iterator<Item = Result<ModeChange<'a>>> + 'a {
    let mut params = params.iter().copied().filter(|p| !p.is_empty());
    SimpleQuery::new(modes).map(move |(value, letter)| {
        if !chanmodes.is_known(letter) {
            return Err(Error::Unknown(letter, value));
        }
        if !chanmodes.takes_param(letter, value) {
            return Ok(ModeChange {
                value,
                letter,
                param: None,
            });
        }
        match params.next() {
            Some(param) => Ok(ModeChange {
                value,
                letter,
                param: Some(param),
            }),
            None if chanmodes.is_list(letter) => Ok(ModeChange {
                value,
                letter,
                param: None,
            }),
            None => Err(Error::MissingParam(letter, value)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(value: bool, letter: char, param: Option<&str>) -> Option<Result<ModeChange<'_>>> {
        Some(Ok(ModeChange {
            value,
            letter,
            param,
        }))
    }

    #[test]
    fn test_simple_query() {
        let mut q = SimpleQuery::new("+ab+C++D+-+E--fg+-h");
        assert_eq!(q.next(), Some((true, 'a')));
        assert_eq!(q.next(), Some((true, 'b')));
        assert_eq!(q.next(), Some((true, 'C')));
        assert_eq!(q.next(), Some((true, 'D')));
        assert_eq!(q.next(), Some((true, 'E')));
        assert_eq!(q.next(), Some((false, 'f')));
        assert_eq!(q.next(), Some((false, 'g')));
        assert_eq!(q.next(), Some((false, 'h')));
        assert_eq!(q.next(), None);

        let mut q = SimpleQuery::new("");
        assert_eq!(q.next(), None);
    }

    #[test]
    fn test_param_consumption() {
        let cm = ChanModes::default();

        let mut q = channel_query(&cm, "+kb", &["beer"]);
        assert_eq!(q.next(), change(true, 'k', Some("beer")));
        assert_eq!(q.next(), change(true, 'b', None));
        assert_eq!(q.next(), None);

        let mut q = channel_query(&cm, "+bk", &["beer", "wine"]);
        assert_eq!(q.next(), change(true, 'b', Some("beer")));
        assert_eq!(q.next(), change(true, 'k', Some("wine")));
        assert_eq!(q.next(), None);

        // -l takes no param, -k still does
        let mut q = channel_query(&cm, "-lk", &["beer"]);
        assert_eq!(q.next(), change(false, 'l', None));
        assert_eq!(q.next(), change(false, 'k', Some("beer")));
        assert_eq!(q.next(), None);

        let mut q = channel_query(&cm, "+o", &[]);
        assert_eq!(q.next(), Some(Err(Error::MissingParam('o', true))));
        assert_eq!(q.next(), None);
    }

    #[test]
    fn test_advertised_quiet() {
        // a server advertising +q as a list mode
        let mut cm = ChanModes::parse("beIq,k,l,imnst").unwrap();
        cm.set_prefix("(ov)@+");

        let mut q = channel_query(&cm, "+qq", &["a!*@*", "b!*@*"]);
        assert_eq!(q.next(), change(true, 'q', Some("a!*@*")));
        assert_eq!(q.next(), change(true, 'q', Some("b!*@*")));
        assert_eq!(q.next(), None);

        // without the advertisement, q is unknown
        let cm = ChanModes::default();
        let mut q = channel_query(&cm, "+q", &["a!*@*"]);
        assert_eq!(q.next(), Some(Err(Error::Unknown('q', true))));
    }

    #[test]
    fn test_prefix_membership() {
        let mut cm = ChanModes::default();
        cm.set_prefix("(qaohv)~&@%+");
        assert!(cm.is_membership('h'));
        assert!(cm.is_membership('q'));
        assert!(!cm.is_list('q'));

        let mut q = channel_query(&cm, "+h-v", &["alice", "bob"]);
        assert_eq!(q.next(), change(true, 'h', Some("alice")));
        assert_eq!(q.next(), change(false, 'v', Some("bob")));
        assert_eq!(q.next(), None);
    }
}
