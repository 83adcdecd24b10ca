//! Shared state and API of the tracking core.
//!
//! This module is split in several files:
//!
//! - `mod.rs`: public API of the tracker and send utilities
//! - `wire.rs`: handlers for inbound server messages
//! - `actions.rs`: the operator commands an embedding client invokes
//!
//! The tracker is one shared object for all of a client's networks.  Everything async is a thin
//! wrapper locking the inner state; the inner handlers are synchronous and take the current time
//! as a parameter, which keeps them testable.

use crate::config::Settings;
use crate::mask::{MaskCache, MaskEntry};
use crate::presence::PresenceCache;
use crate::queue::{CommandQueue, Executor};
use crate::sync::{Outcome, SyncEngine};
use crate::{util, Error};
use opaline_tokens::{Buffer, Casemapping, Command, Isupport, Message};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

mod actions;
mod wire;
#[cfg(test)]
mod test;

/// Outgoing lines for one network, CRLF included.  The embedding client owns the receiving end
/// and the socket.
pub type MessageQueue = mpsc::UnboundedSender<String>;

/// A completion callback for a mask-list fetch.  Run by the tracker once the fetch settles.
pub(crate) type SyncCallback = Box<dyn FnOnce(&mut TrackerInner, Outcome) + Send>;

/// What the tracker reports back to the embedding client.
///
/// Most operations span several protocol round-trips; their results arrive here rather than as
/// return values.
#[derive(Clone, Debug)]
pub enum Event {
    /// Result of a mask search.
    Masks {
        network: String,
        channel: String,
        mode: char,
        query: String,
        entries: Vec<MaskEntry>,
    },

    /// A mask-list refresh completed with this many masks.
    Synced {
        network: String,
        channel: String,
        mode: char,
        count: usize,
    },

    /// A mask-removal request matched nothing; no commands were sent.
    NoMatches {
        network: String,
        channel: String,
        mode: char,
        query: String,
    },

    /// An operation failed.  The error displays as user-presentable text.
    Failed { network: String, error: Error },
}

/// Channel-operator state tracker for IRC clients.
///
/// This is just an `Arc` to the real data, so it's cheap to clone and clones share the same
/// data.  The embedding client owns the connections: it feeds every inbound line to
/// [`Tracker::handle_message`], writes whatever appears on the per-network outgoing queue to the
/// socket, and displays [`Event`]s from the receiver handed out by [`Tracker::new`].
///
/// # Example
///
/// ```rust
/// # use opaline::{Settings, Tracker};
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let (tracker, _events) = Tracker::new(Settings::sample());
///
/// // One outgoing queue per network connection.
/// let (queue, mut outgoing) = tokio::sync::mpsc::unbounded_channel();
/// tracker.network_joined("libera", "mynick", queue).await;
///
/// // Track a channel; the tracker asks WHO to learn everyone's hostmask.
/// tracker.watch("libera", "#chan").await;
/// assert_eq!(outgoing.recv().await.unwrap(), "WHO #chan\r\n");
/// # });
/// ```
#[derive(Clone)]
pub struct Tracker(Arc<Mutex<TrackerInner>>);

impl Tracker {
    /// Creates the tracker and the event stream the embedding client displays.
    pub fn new(settings: Settings) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let inner = TrackerInner::new(settings, events);
        (Self(Arc::new(Mutex::new(inner))), receiver)
    }

    /// Registers a connected network.  `nick` is our nickname on it; the queue carries outgoing
    /// lines back to the client.
    pub async fn network_joined(&self, network: &str, nick: &str, queue: MessageQueue) {
        self.0.lock().await.network_joined(network, nick, queue);
    }

    /// Forgets a network entirely, caches included.
    pub async fn network_quit(&self, network: &str) {
        self.0.lock().await.network_quit(network);
    }

    /// Handles a connection loss: aborts in-flight fetches, drops queued commands, and marks
    /// every known user as departed.  Mask lists survive; their freshness window decides whether
    /// a fetch is needed after the reconnect.
    pub async fn connection_reset(&self, network: &str) {
        self.0.lock().await.connection_reset(network, util::time());
    }

    /// Updates the state according to the given server message.
    pub async fn handle_message(&self, network: &str, msg: Message<'_>) {
        self.0.lock().await.handle_message(network, &msg, util::time());
    }

    /// Starts tracking a channel.
    pub async fn watch(&self, network: &str, channel: &str) {
        self.0.lock().await.watch(network, channel, util::time());
    }

    /// Stops tracking a channel and drops its cached state.
    pub async fn unwatch(&self, network: &str, channel: &str) {
        self.0.lock().await.unwatch(network, channel);
    }

    /// Bans a user.  `target` is a nickname, a hostmask or a mask pattern.
    pub async fn ban(&self, network: &str, channel: &str, target: &str) {
        self.0.lock().await.cmd_mask(network, channel, 'b', target, util::time());
    }

    /// Removes the bans matching `target`.
    pub async fn unban(&self, network: &str, channel: &str, target: &str) {
        self.0.lock().await.cmd_unmask(network, channel, 'b', target, util::time());
    }

    /// Quiets a user (mode `+q`, where the server supports it).
    pub async fn quiet(&self, network: &str, channel: &str, target: &str) {
        self.0.lock().await.cmd_mask(network, channel, 'q', target, util::time());
    }

    /// Removes the quiets matching `target`.
    pub async fn unquiet(&self, network: &str, channel: &str, target: &str) {
        self.0.lock().await.cmd_unmask(network, channel, 'q', target, util::time());
    }

    /// Kicks users from a channel.
    pub async fn kick(&self, network: &str, channel: &str, nicks: &[&str], reason: &str) {
        self.0.lock().await.cmd_kick(network, channel, nicks, reason, util::time());
    }

    /// Bans a user then kicks them.
    pub async fn kickban(&self, network: &str, channel: &str, nick: &str, reason: &str) {
        self.0.lock().await.cmd_kickban(network, channel, nick, reason, util::time());
    }

    /// Grants operator status to users.
    pub async fn op(&self, network: &str, channel: &str, nicks: &[&str]) {
        self.0.lock().await.cmd_member(network, channel, true, 'o', nicks, util::time());
    }

    /// Removes operator status from users.
    pub async fn deop(&self, network: &str, channel: &str, nicks: &[&str]) {
        self.0.lock().await.cmd_member(network, channel, false, 'o', nicks, util::time());
    }

    /// Grants voice to users.
    pub async fn voice(&self, network: &str, channel: &str, nicks: &[&str]) {
        self.0.lock().await.cmd_member(network, channel, true, 'v', nicks, util::time());
    }

    /// Removes voice from users.
    pub async fn devoice(&self, network: &str, channel: &str, nicks: &[&str]) {
        self.0.lock().await.cmd_member(network, channel, false, 'v', nicks, util::time());
    }

    /// Refreshes a mask list; completion arrives as [`Event::Synced`].
    pub async fn sync_masks(&self, network: &str, channel: &str, mode: char) {
        self.0.lock().await.sync_masks(network, channel, mode, util::time());
    }

    /// Looks up the masks affecting `query`, refreshing the list first when it is stale.  The
    /// result arrives as [`Event::Masks`].
    pub async fn find_masks(&self, network: &str, channel: &str, mode: char, query: &str) {
        self.0.lock().await.find_masks(network, channel, mode, query, util::time());
    }

    /// Fires time-based transitions: op-wait timeouts, delayed lines, cache expiry.  Call about
    /// once a second, or use [`Tracker::start_ticking`].
    pub async fn tick(&self) {
        self.0.lock().await.tick(util::time());
    }

    /// Spawns a task calling [`Tracker::tick`] every second.
    pub fn start_ticking(&self) -> tokio::task::JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                tracker.tick().await;
            }
        })
    }
}

/// Per-connection state.
pub(crate) struct Network {
    queue: MessageQueue,

    /// What the server advertised in RPL_ISUPPORT.
    caps: Isupport,

    /// Our own nickname, as the server spells it.
    me: String,

    /// Tracked channels, folded through the casemapping.
    tracked: HashSet<String>,

    /// Folded channel name to the folded nicks holding operator status there.
    ops: HashMap<String, HashSet<String>>,

    commands: CommandQueue,

    /// When to give the operator flag back, once the command queue is empty.
    pending_deop: Option<(String, u64)>,
}

impl Network {
    fn new(me: &str, queue: MessageQueue, settings: &Settings) -> Self {
        Self {
            queue,
            caps: Isupport::default(),
            me: me.to_owned(),
            tracked: HashSet::new(),
            ops: HashMap::new(),
            commands: CommandQueue::new(settings.queue_limit, settings.op_timeout),
            pending_deop: None,
        }
    }

    fn send(&self, line: String) {
        if self.queue.send(line).is_err() {
            log::warn!("outgoing queue closed, line dropped");
        }
    }

    fn cm(&self) -> Casemapping {
        self.caps.casemapping
    }

    fn is_me(&self, nick: &str) -> bool {
        self.cm().eq(nick, &self.me)
    }

    fn is_tracked(&self, channel: &str) -> bool {
        self.tracked.contains(&self.cm().lower(channel))
    }

    fn run_queue(&mut self, now: u64) {
        let Network { queue, caps, me, tracked, ops, commands, .. } = self;
        let mut ex = NetExecutor { queue, caps, me, tracked, ops };
        commands.run(now, &mut ex);
    }

    fn resume_queue(&mut self, now: u64) {
        let Network { queue, caps, me, tracked, ops, commands, .. } = self;
        let mut ex = NetExecutor { queue, caps, me, tracked, ops };
        commands.resume(now, &mut ex);
    }

    fn tick_queue(&mut self, now: u64) -> Option<Error> {
        let Network { queue, caps, me, tracked, ops, commands, .. } = self;
        let mut ex = NetExecutor { queue, caps, me, tracked, ops };
        commands.tick(now, &mut ex)
    }
}

/// The command queue's view of a network, borrowing around the queue itself.
struct NetExecutor<'a> {
    queue: &'a MessageQueue,
    caps: &'a Isupport,
    me: &'a str,
    tracked: &'a mut HashSet<String>,
    ops: &'a HashMap<String, HashSet<String>>,
}

impl Executor for NetExecutor<'_> {
    fn send(&mut self, line: &str) {
        if self.queue.send(line.to_owned()).is_err() {
            log::warn!("outgoing queue closed, line dropped");
        }
    }

    fn is_op(&self, channel: &str) -> bool {
        let cm = self.caps.casemapping;
        self.ops
            .get(&cm.lower(channel))
            .map_or(false, |nicks| nicks.contains(&cm.lower(self.me)))
    }

    fn watch(&mut self, channel: &str) {
        self.tracked.insert(self.caps.casemapping.lower(channel));
    }
}

/// The actual shared data of the tracker.
pub(crate) struct TrackerInner {
    settings: Settings,

    /// Per-connection state, keyed by the client's name for the network.
    networks: HashMap<String, Network>,

    masks: MaskCache,
    presence: PresenceCache,
    sync: SyncEngine<SyncCallback>,

    events: mpsc::UnboundedSender<Event>,
}

impl TrackerInner {
    fn new(mut settings: Settings, events: mpsc::UnboundedSender<Event>) -> Self {
        settings.validate();
        Self {
            settings,
            networks: HashMap::new(),
            masks: MaskCache::new(),
            presence: PresenceCache::new(),
            sync: SyncEngine::new(),
            events,
        }
    }

    pub fn network_joined(&mut self, network: &str, nick: &str, queue: MessageQueue) {
        log::debug!("{}: connected as {}", network, nick);
        self.networks
            .insert(network.to_owned(), Network::new(nick, queue, &self.settings));
    }

    pub fn network_quit(&mut self, network: &str) {
        log::debug!("{}: removed", network);
        self.networks.remove(network);
        self.masks.remove_network(network);
        self.presence.forget_network(network);
        // no one is left to tell about the aborted fetches
        self.sync.reset(network);
    }

    pub fn connection_reset(&mut self, network: &str, now: u64) {
        log::debug!("{}: connection reset", network);
        let aborted = self.sync.reset(network);
        for (callback, outcome) in aborted {
            callback(self, outcome);
        }
        if let Some(net) = self.networks.get_mut(network) {
            net.commands.clear();
            net.ops.clear();
            net.pending_deop = None;
            // the next registration renegotiates everything
            net.caps = Isupport::default();
        }
        self.presence.on_disconnect(network, now);
    }

    pub fn handle_message(&mut self, network: &str, msg: &Message<'_>, now: u64) {
        if !self.networks.contains_key(network) {
            log::warn!("{}: message for an unregistered network", network);
            return;
        }
        if let Ok(Command::Reply(numeric)) = msg.command {
            self.on_reply(network, numeric, msg, now);
            return;
        }
        if msg.has_enough_params() {
            match msg.command {
                Ok(Command::Join) => self.on_join(network, msg),
                Ok(Command::Part) => self.on_part(network, msg, now),
                Ok(Command::Quit) => self.on_quit(network, msg, now),
                Ok(Command::Nick) => self.on_nick(network, msg, now),
                Ok(Command::Kick) => self.on_kick(network, msg, now),
                Ok(Command::Mode) => self.on_mode(network, msg, now),
                _ => {}
            }
        } else if let Ok(
            cmd @ (Command::Join
            | Command::Part
            | Command::Quit
            | Command::Nick
            | Command::Kick
            | Command::Mode),
        ) = msg.command
        {
            log::warn!("{}: truncated {} line, skipped", network, cmd);
            self.fail(network, Error::MalformedLine);
        }
    }

    pub fn tick(&mut self, now: u64) {
        self.presence.purge_expired(now, self.settings.grace_period);
        self.masks.sweep(now, self.settings.pattern_idle);

        let mut failures = Vec::new();
        for (name, net) in self.networks.iter_mut() {
            if let Some(error) = net.tick_queue(now) {
                failures.push((name.clone(), error));
            }
            let deop_due = match &net.pending_deop {
                Some((_, deadline)) => *deadline <= now && net.commands.is_empty(),
                None => false,
            };
            if deop_due {
                if let Some((channel, _)) = net.pending_deop.take() {
                    log::debug!("{}: giving the operator flag back in {}", name, channel);
                    let mut buf = Buffer::new();
                    buf.message("", Command::Mode)
                        .param(&channel)
                        .param("-o")
                        .param(&net.me);
                    net.send(buf.build());
                }
            }
        }
        for (network, error) in failures {
            self.emit(Event::Failed { network, error });
        }
    }

    pub(crate) fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            log::warn!("event receiver dropped");
        }
    }

    fn fail(&self, network: &str, error: Error) {
        self.emit(Event::Failed {
            network: network.to_owned(),
            error,
        });
    }

    /// Asks the sync engine for an up-to-date list and runs the callback when it settles, which
    /// may be immediately.
    pub(crate) fn request_sync(
        &mut self,
        network: &str,
        channel: &str,
        mode: char,
        now: u64,
        callback: SyncCallback,
    ) {
        let done = {
            let TrackerInner { networks, masks, sync, settings, .. } = &mut *self;
            let net = match networks.get(network) {
                Some(net) => net,
                None => return,
            };
            let queue = net.queue.clone();
            sync.request(
                &net.caps,
                masks,
                settings.freshness_window,
                now,
                network,
                channel,
                mode,
                callback,
                &mut |line| {
                    if queue.send(line).is_err() {
                        log::warn!("outgoing queue closed, line dropped");
                    }
                },
            )
        };
        if let Some((callback, outcome)) = done {
            callback(self, outcome);
        }
    }
}
