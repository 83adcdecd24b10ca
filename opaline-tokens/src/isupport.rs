use crate::casemap::Casemapping;
use crate::mode::ChanModes;

/// The subset of RPL_ISUPPORT the tracking core consumes.
///
/// Tokens are read-only configuration from the client's point of view: the server announces them
/// once at registration and they rule casemapping, argument consumption and mode batching until
/// the connection drops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Isupport {
    pub casemapping: Casemapping,
    pub chanmodes: ChanModes,

    /// How many mode changes fit in one MODE command (the `MODES` token).
    pub max_modes: usize,
}

impl Default for Isupport {
    fn default() -> Self {
        Self {
            casemapping: Casemapping::default(),
            chanmodes: ChanModes::default(),
            max_modes: 3,
        }
    }
}

impl Isupport {
    /// Feeds the parameters of one 005 reply (excluding the leading client name and the trailing
    /// "are supported" text).
    ///
    /// Unknown tokens are ignored; malformed known tokens keep the previous value.
    pub fn update(&mut self, tokens: &[&str]) {
        for token in tokens {
            let mut split = token.splitn(2, '=');
            let key = split.next().unwrap_or("");
            let value = split.next().unwrap_or("");
            match key {
                "CASEMAPPING" => {
                    if let Some(cm) = Casemapping::parse(value) {
                        self.casemapping = cm;
                    }
                }
                "CHANMODES" => {
                    if let Some(cm) = ChanModes::parse(value) {
                        let membership = self.chanmodes.membership.clone();
                        self.chanmodes = cm;
                        self.chanmodes.membership = membership;
                    }
                }
                "PREFIX" => self.chanmodes.set_prefix(value),
                "MODES" => {
                    if value.is_empty() {
                        // no advertised limit; stay conservative anyway
                        self.max_modes = 12;
                    } else if let Ok(n) = value.parse() {
                        if n > 0 {
                            self.max_modes = n;
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Whether the server supports fetching a mask list for this mode letter.
    pub fn has_list_mode(&self, mode: char) -> bool {
        self.chanmodes.is_list(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update() {
        let mut caps = Isupport::default();
        caps.update(&[
            "CASEMAPPING=ascii",
            "CHANMODES=beIq,k,l,imnst",
            "PREFIX=(ov)@+",
            "MODES=4",
            "NICKLEN=30",
        ]);
        assert_eq!(caps.casemapping, Casemapping::Ascii);
        assert!(caps.has_list_mode('q'));
        assert!(!caps.has_list_mode('o'));
        assert_eq!(caps.max_modes, 4);
    }

    #[test]
    fn test_prefix_survives_chanmodes() {
        let mut caps = Isupport::default();
        caps.update(&["PREFIX=(qaohv)~&@%+"]);
        caps.update(&["CHANMODES=beI,k,l,imnst"]);
        assert!(caps.chanmodes.is_membership('h'));
    }

    #[test]
    fn test_malformed_tokens() {
        let mut caps = Isupport::default();
        caps.update(&["CHANMODES=b", "MODES=zero", "CASEMAPPING=utf8"]);
        assert_eq!(caps, Isupport::default());
    }
}
