//! The mode-list fetch state machine.
//!
//! Refreshing a mask list is a multi-message exchange: send `MODE #chan +b`, collect streamed
//! 367 replies, stop at the 368 end-of-list marker.  Only one fetch is in flight per network at
//! a time; further requests queue FIFO.  Replies are staged and committed to the cache in one
//! step when the end marker arrives, so a half-received list is never visible and a dropped
//! connection can throw the staging away without corrupting anything.
//!
//! The engine never calls its completion callbacks itself; it hands them back to the caller
//! (with the outcome) so they can run with full access to the tracker state.

use crate::mask::{MaskCache, MaskEntry};
use opaline_tokens::{rpl, Buffer, Command, Isupport, Message};
use std::collections::{HashMap, VecDeque};

/// How a sync request ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The cached list was younger than the freshness window; nothing was sent.
    Fresh,

    /// A full fetch completed with this many masks.
    Synced(usize),

    /// The server does not advertise this list mode; nothing was sent.
    Unsupported,

    /// The connection was reset mid-fetch; the cache was left untouched.
    Aborted,
}

/// The mode letter whose list a streamed reply numeric belongs to.
fn list_reply_mode(numeric: u16) -> Option<char> {
    match numeric {
        rpl::BANLIST => Some('b'),
        rpl::QUIETLIST => Some('q'),
        rpl::INVITELIST => Some('I'),
        rpl::EXCEPTLIST => Some('e'),
        _ => None,
    }
}

/// The mode letter whose list an end-of-list numeric terminates.
fn end_reply_mode(numeric: u16) -> Option<char> {
    match numeric {
        rpl::ENDOFBANLIST => Some('b'),
        rpl::ENDOFQUIETLIST => Some('q'),
        rpl::ENDOFINVITELIST => Some('I'),
        rpl::ENDOFEXCEPTLIST => Some('e'),
        _ => None,
    }
}

fn request_line(channel: &str, mode: char) -> String {
    let mut buf = Buffer::new();
    {
        let mut msg = buf.message("", Command::Mode).param(channel);
        let param = msg.raw_param();
        param.push('+');
        param.push(mode);
    }
    buf.build()
}

/// One fetch awaiting dispatch or completion.
struct Pending<C> {
    /// The channel as the caller spelled it, for the wire.
    channel: String,

    /// The channel folded through the casemapping, for comparisons.
    channel_key: String,

    mode: char,
    staged: Vec<MaskEntry>,
    callbacks: Vec<C>,
}

impl<C> Pending<C> {
    fn is(&self, channel_key: &str, mode: char) -> bool {
        self.mode == mode && self.channel_key == channel_key
    }
}

struct Flight<C> {
    current: Option<Pending<C>>,
    queue: VecDeque<Pending<C>>,
}

impl<C> Default for Flight<C> {
    fn default() -> Self {
        Self {
            current: None,
            queue: VecDeque::new(),
        }
    }
}

/// Per-network fetch serialization.
///
/// `C` is an opaque completion callback; the engine stores and returns it, nothing more.
pub struct SyncEngine<C> {
    flights: HashMap<String, Flight<C>>,
}

impl<C> Default for SyncEngine<C> {
    fn default() -> Self {
        Self {
            flights: HashMap::new(),
        }
    }
}

impl<C> SyncEngine<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a fetch is in flight on the network.
    pub fn in_flight(&self, network: &str) -> bool {
        self.flights
            .get(network)
            .map_or(false, |flight| flight.current.is_some())
    }

    /// Asks for an up-to-date mask list.
    ///
    /// Returns `Some((callback, outcome))` when the request completes synchronously, without a
    /// network round-trip: the mode is not advertised, or the cached list is fresh enough.
    /// Otherwise the callback is stored and handed back by `on_list_end` or `reset`.
    #[allow(clippy::too_many_arguments)]
    pub fn request(
        &mut self,
        caps: &Isupport,
        cache: &MaskCache,
        freshness_window: u64,
        now: u64,
        network: &str,
        channel: &str,
        mode: char,
        callback: C,
        send: &mut dyn FnMut(String),
    ) -> Option<(C, Outcome)> {
        let cm = caps.casemapping;
        if !caps.has_list_mode(mode) {
            log::debug!("{}: +{} not advertised, nothing to fetch", network, mode);
            return Some((callback, Outcome::Unsupported));
        }
        if !cache.is_stale(cm, network, channel, mode, freshness_window, now) {
            return Some((callback, Outcome::Fresh));
        }

        let channel_key = cm.lower(channel);
        let flight = self.flights.entry(network.to_owned()).or_default();

        // identical pending tuples are not re-added
        if let Some(current) = flight.current.as_mut() {
            if current.is(&channel_key, mode) {
                current.callbacks.push(callback);
                return None;
            }
        }
        if let Some(queued) = flight
            .queue
            .iter_mut()
            .find(|pending| pending.is(&channel_key, mode))
        {
            queued.callbacks.push(callback);
            return None;
        }

        let pending = Pending {
            channel: channel.to_owned(),
            channel_key,
            mode,
            staged: Vec::new(),
            callbacks: vec![callback],
        };
        if flight.current.is_none() {
            log::debug!("{}: fetching +{} list of {}", network, mode, channel);
            send(request_line(channel, mode));
            flight.current = Some(pending);
        } else {
            log::debug!("{}: queueing +{} fetch of {}", network, mode, channel);
            flight.queue.push_back(pending);
        }
        None
    }

    /// Stages one streamed list reply for the in-flight fetch.
    ///
    /// Lines that do not belong to the in-flight request (the user ran `/mode +b` by hand, or
    /// the shape is wrong) are skipped without aborting the fetch.
    pub fn on_list_line(&mut self, network: &str, caps: &Isupport, msg: &Message<'_>) {
        let numeric = match msg.command {
            Ok(Command::Reply(numeric)) => numeric,
            _ => return,
        };
        let mode = match list_reply_mode(numeric) {
            Some(mode) => mode,
            None => return,
        };
        // 728 carries the mode letter as an extra parameter before the mask
        let mask_at = if numeric == rpl::QUIETLIST { 3 } else { 2 };

        let current = match self
            .flights
            .get_mut(network)
            .and_then(|flight| flight.current.as_mut())
        {
            Some(current) => current,
            None => {
                log::debug!("{}: unsolicited {} reply, ignored", network, numeric);
                return;
            }
        };
        if current.mode != mode {
            log::debug!("{}: {} reply does not match the +{} fetch", network, numeric, current.mode);
            return;
        }
        if msg.num_params <= mask_at || msg.params[mask_at].is_empty() {
            log::warn!("{}: malformed {} reply, line skipped", network, numeric);
            return;
        }
        if !caps.casemapping.eq(msg.params[1], &current.channel_key) {
            log::debug!("{}: {} reply for another channel, ignored", network, numeric);
            return;
        }

        let setter = if mask_at + 1 < msg.num_params {
            Some(msg.params[mask_at + 1].to_owned())
        } else {
            None
        };
        let set_at = if mask_at + 2 < msg.num_params {
            msg.params[mask_at + 2].parse().unwrap_or_else(|_| {
                log::warn!("{}: bad timestamp in {} reply", network, numeric);
                0
            })
        } else {
            0
        };
        current.staged.push(MaskEntry {
            mask: msg.params[mask_at].to_owned(),
            setter,
            set_at,
            affected: None,
        });
    }

    /// Commits the in-flight fetch on its end-of-list marker and dispatches the next one.
    ///
    /// Returns the completion callbacks of the finished fetch; the caller runs them.
    pub fn on_list_end(
        &mut self,
        network: &str,
        caps: &Isupport,
        msg: &Message<'_>,
        cache: &mut MaskCache,
        now: u64,
        send: &mut dyn FnMut(String),
    ) -> Vec<(C, Outcome)> {
        let numeric = match msg.command {
            Ok(Command::Reply(numeric)) => numeric,
            _ => return Vec::new(),
        };
        let mode = match end_reply_mode(numeric) {
            Some(mode) => mode,
            None => return Vec::new(),
        };
        let flight = match self.flights.get_mut(network) {
            Some(flight) => flight,
            None => return Vec::new(),
        };
        let matches = flight.current.as_ref().map_or(false, |current| {
            current.mode == mode
                && msg.num_params > 1
                && caps.casemapping.eq(msg.params[1], &current.channel_key)
        });
        if !matches {
            log::debug!("{}: unsolicited end-of-list {}, ignored", network, numeric);
            return Vec::new();
        }

        let done = match flight.current.take() {
            Some(done) => done,
            None => return Vec::new(),
        };
        let count = done.staged.len();
        log::debug!(
            "{}: +{} list of {} synced, {} masks",
            network,
            mode,
            done.channel,
            count
        );
        cache.commit_synced(
            caps.casemapping,
            network,
            &done.channel,
            mode,
            done.staged,
            now,
        );
        let results = done
            .callbacks
            .into_iter()
            .map(|callback| (callback, Outcome::Synced(count)))
            .collect();

        if let Some(next) = flight.queue.pop_front() {
            log::debug!("{}: fetching +{} list of {}", network, next.mode, next.channel);
            send(request_line(&next.channel, next.mode));
            flight.current = Some(next);
        }
        results
    }

    /// Abandons everything in flight and queued for the network.
    ///
    /// Staged entries are discarded: partial data must never reach the cache.  Returns the
    /// orphaned callbacks so the caller can fail them.
    pub fn reset(&mut self, network: &str) -> Vec<(C, Outcome)> {
        let flight = match self.flights.remove(network) {
            Some(flight) => flight,
            None => return Vec::new(),
        };
        let mut results = Vec::new();
        if let Some(current) = flight.current {
            log::debug!(
                "{}: abandoning in-flight +{} fetch of {}",
                network,
                current.mode,
                current.channel
            );
            for callback in current.callbacks {
                results.push((callback, Outcome::Aborted));
            }
        }
        for pending in flight.queue {
            for callback in pending.callbacks {
                results.push((callback, Outcome::Aborted));
            }
        }
        results
    }
}
