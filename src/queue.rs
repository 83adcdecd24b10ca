//! Pacing of outgoing operator actions.
//!
//! Sending a MODE or KICK before the server has granted operator status fails silently or with
//! a 482; servers also rate-limit clients.  The queue decouples "what the user asked for" from
//! "what is safe to send right now": commands drain strictly FIFO, an op request at the head
//! halts draining until the grant is observed (`resume`) or the window expires (`timeout`), and
//! a safety limit guards against a logic bug generating commands without bound.

use crate::Error;
use std::collections::VecDeque;

/// A unit of outgoing protocol action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueuedCommand {
    /// A raw line to send, after `delay` seconds of artificial spacing (0 sends immediately).
    Raw { line: String, delay: u64 },

    /// Sends `request` (e.g. a ChanServ OP message) and halts draining until the grant event
    /// arrives.  Skipped entirely when we already have op.
    RequestOp { channel: String, request: String },

    /// Marks a channel for tracking.  Side effect only, nothing hits the wire.
    Watch { channel: String },
}

/// What the queue needs from its surroundings to execute commands.
pub trait Executor {
    /// Sends a raw line on the network connection.
    fn send(&mut self, line: &str);

    /// Whether we currently hold operator status in the channel.
    fn is_op(&self, channel: &str) -> bool;

    /// Marks a channel for tracking.
    fn watch(&mut self, channel: &str);
}

/// Where the queue stopped draining.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,

    /// An op request went out; draining resumes on `resume` or dies on `timeout`.
    BlockedOnOp { channel: String, since: u64 },

    /// A delayed line is held back until the deadline.
    Delayed { until: u64 },
}

/// FIFO queue of privileged commands for one network.
pub struct CommandQueue {
    items: VecDeque<QueuedCommand>,
    state: RunState,

    /// The line taken out of a delayed `Raw`, sent when its deadline passes.
    held: Option<String>,

    limit: usize,
    op_timeout: u64,
}

impl CommandQueue {
    pub fn new(limit: usize, op_timeout: u64) -> Self {
        Self {
            items: VecDeque::new(),
            state: RunState::Idle,
            held: None,
            limit,
            op_timeout,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.held.is_none()
    }

    /// Appends a command, or clears everything when the safety limit is hit.
    ///
    /// Clearing is all-or-nothing: executing a random half of a batch would be more confusing
    /// than executing none of it.
    pub fn enqueue(&mut self, command: QueuedCommand) -> crate::Result<()> {
        if self.limit <= self.items.len() {
            let dropped = self.items.len() + 1;
            self.clear();
            log::error!("command queue over its limit, dropping {} commands", dropped);
            return Err(Error::QueueOverflow { dropped });
        }
        self.items.push_back(command);
        Ok(())
    }

    /// Drains the queue until it empties or a command needs to wait.
    pub fn run(&mut self, now: u64, ex: &mut dyn Executor) {
        loop {
            match self.state.clone() {
                RunState::BlockedOnOp { .. } => return,
                RunState::Delayed { until } => {
                    if now < until {
                        return;
                    }
                    if let Some(line) = self.held.take() {
                        ex.send(&line);
                    }
                    self.state = RunState::Idle;
                }
                RunState::Idle => {}
            }
            let command = match self.items.pop_front() {
                Some(command) => command,
                None => return,
            };
            match command {
                QueuedCommand::Raw { line, delay } => {
                    if delay == 0 {
                        ex.send(&line);
                    } else {
                        self.held = Some(line);
                        self.state = RunState::Delayed {
                            until: now.saturating_add(delay),
                        };
                    }
                }
                QueuedCommand::RequestOp { channel, request } => {
                    if ex.is_op(&channel) {
                        log::debug!("already operator in {}, not asking again", channel);
                    } else {
                        ex.send(&request);
                        self.state = RunState::BlockedOnOp { channel, since: now };
                    }
                }
                QueuedCommand::Watch { channel } => ex.watch(&channel),
            }
        }
    }

    /// Continues draining after the operator-status grant was observed.
    pub fn resume(&mut self, now: u64, ex: &mut dyn Executor) {
        match self.state {
            RunState::BlockedOnOp { .. } => {
                self.state = RunState::Idle;
                self.run(now, ex);
            }
            _ => log::debug!("resume without a blocked queue, ignored"),
        }
    }

    /// Aborts the whole batch because the op grant never came.
    pub fn timeout(&mut self) -> Option<Error> {
        match std::mem::replace(&mut self.state, RunState::Idle) {
            RunState::BlockedOnOp { channel, .. } => {
                self.clear();
                Some(Error::OpGrantTimeout { channel })
            }
            state => {
                self.state = state;
                None
            }
        }
    }

    /// Fires deadline-based transitions: delayed lines whose spacing elapsed, op waits whose
    /// window expired.
    pub fn tick(&mut self, now: u64, ex: &mut dyn Executor) -> Option<Error> {
        match self.state {
            RunState::BlockedOnOp { since, .. } => {
                if since.saturating_add(self.op_timeout) <= now {
                    return self.timeout();
                }
            }
            RunState::Delayed { .. } => self.run(now, ex),
            RunState::Idle => {}
        }
        None
    }

    /// Drops every queued command and resets the state.
    pub fn clear(&mut self) {
        self.items.clear();
        self.held = None;
        self.state = RunState::Idle;
    }
}
