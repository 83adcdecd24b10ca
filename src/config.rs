//! Tracker settings.
//!
//! The core is a library; the embedding client owns configuration files and persistence.  It
//! builds a `Settings` once and hands it to `Tracker::new`.  Zero values are normalized to the
//! sample defaults by `validate`, so a client can fill only the fields it cares about.

/// Settings for `Tracker`.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Maximum age in seconds of a cached mask list before a new fetch hits the server.
    pub freshness_window: u64,

    /// How long in seconds a departed user stays resolvable, to keep them bannable across
    /// reconnects.
    pub grace_period: u64,

    /// How long in seconds to wait for an operator-status grant before aborting a batch.
    pub op_timeout: u64,

    /// Hard cap on queued privileged commands.  Exceeding it clears the queue entirely.
    pub queue_limit: usize,

    /// Seconds a compiled mask pattern may go unused before the sweep drops it.
    pub pattern_idle: u64,

    /// Seconds between queued kick lines, to stay under server flood limits.
    pub kick_spacing: u64,

    /// Give the operator flag back this many seconds after a batch drains.  `None` keeps op.
    pub auto_deop_after: Option<u64>,

    /// The raw command used to ask for operator status.  `{channel}` and `{nick}` are
    /// substituted before sending.
    pub op_request_command: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self::sample()
    }
}

impl Settings {
    pub fn sample() -> Self {
        Self {
            freshness_window: 60,
            grace_period: 30 * 60,
            op_timeout: 30,
            queue_limit: 16,
            pattern_idle: 10 * 60,
            kick_spacing: 1,
            auto_deop_after: Some(180),
            op_request_command: "PRIVMSG ChanServ :OP {channel}".to_owned(),
        }
    }

    /// Replaces zero values with the sample defaults.
    pub fn validate(&mut self) {
        let def = Self::sample();

        if self.freshness_window == 0 {
            self.freshness_window = def.freshness_window;
        }
        if self.grace_period == 0 {
            self.grace_period = def.grace_period;
        }
        if self.op_timeout == 0 {
            self.op_timeout = def.op_timeout;
        }
        if self.queue_limit == 0 {
            self.queue_limit = def.queue_limit;
        }
        if self.pattern_idle == 0 {
            self.pattern_idle = def.pattern_idle;
        }
        if self.op_request_command.is_empty() {
            self.op_request_command = def.op_request_command;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_fills_zeroes() {
        let mut settings = Settings {
            freshness_window: 0,
            grace_period: 1,
            op_timeout: 0,
            queue_limit: 0,
            pattern_idle: 5,
            kick_spacing: 0,
            auto_deop_after: None,
            op_request_command: String::new(),
        };
        settings.validate();
        assert_eq!(settings.freshness_window, Settings::sample().freshness_window);
        assert_eq!(settings.grace_period, 1);
        assert_eq!(settings.queue_limit, Settings::sample().queue_limit);
        assert_eq!(settings.op_request_command, Settings::sample().op_request_command);
        // spacing of zero is a valid choice
        assert_eq!(settings.kick_spacing, 0);
    }
}
