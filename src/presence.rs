//! Nickname to hostmask resolution for tracked channels.
//!
//! IRC only gives the full `nick!user@host` of a user in a handful of places (JOIN prefixes, WHO
//! replies).  By the time an operator wants to ban someone, that someone may already have left.
//! Records are therefore soft-deleted on part/quit and kept resolvable for a grace window, so a
//! user who storms out is still bannable, and one who rejoins quickly is resurrected instead of
//! re-learned.

use opaline_tokens::{Casemapping, Hostmask};
use std::collections::HashMap;

/// One nick's entry in a channel.
#[derive(Clone, Debug)]
pub struct UserRecord {
    /// The authoritative `nick!user@host` for this nick in this channel.
    pub hostmask: String,

    /// Set when the user left; the record is dropped once this is older than the grace window.
    departed_at: Option<u64>,
}

impl UserRecord {
    /// Whether the user has left and awaits hard deletion.
    pub fn is_departed(&self) -> bool {
        self.departed_at.is_some()
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct ChanKey {
    network: String,
    channel: String,
}

/// Per-(network, channel) map of nickname to hostmask.
///
/// All nick and channel arguments are folded through the network's casemapping before use, so
/// lookups match the way the server compares names.
#[derive(Default)]
pub struct PresenceCache {
    channels: HashMap<ChanKey, HashMap<String, UserRecord>>,
}

impl PresenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(cm: Casemapping, network: &str, channel: &str) -> ChanKey {
        ChanKey {
            network: network.to_owned(),
            channel: cm.lower(channel),
        }
    }

    /// Inserts or refreshes a user from their JOIN (or WHO) hostmask.
    ///
    /// A pending soft deletion for this nick is cancelled: the user is back.
    pub fn on_join(&mut self, cm: Casemapping, network: &str, channel: &str, hostmask: &str) {
        let nick = match Hostmask::parse(hostmask) {
            Some(mask) => mask.nick,
            None => {
                log::warn!("{}: join with partial hostmask {:?}", network, hostmask);
                return;
            }
        };
        self.channels
            .entry(Self::key(cm, network, channel))
            .or_default()
            .insert(
                cm.lower(nick),
                UserRecord {
                    hostmask: hostmask.to_owned(),
                    departed_at: None,
                },
            );
    }

    /// Marks a user as departed from one channel.  The record stays resolvable until the grace
    /// window elapses.
    pub fn on_part(&mut self, cm: Casemapping, network: &str, channel: &str, nick: &str, now: u64) {
        if let Some(users) = self.channels.get_mut(&Self::key(cm, network, channel)) {
            if let Some(record) = users.get_mut(&cm.lower(nick)) {
                record.departed_at = Some(now);
            }
        }
    }

    /// Marks a user as departed from every channel of the network.
    pub fn on_quit(&mut self, cm: Casemapping, network: &str, nick: &str, now: u64) {
        let nick = cm.lower(nick);
        for (key, users) in self.channels.iter_mut() {
            if key.network != network {
                continue;
            }
            if let Some(record) = users.get_mut(&nick) {
                record.departed_at = Some(now);
            }
        }
    }

    /// Renames a user in every channel of the network.
    ///
    /// The old nick is kept as a soft-deleted record (still bannable under its old mask); the new
    /// nick gets the same user and host with the nick part replaced.
    pub fn on_nick_change(
        &mut self,
        cm: Casemapping,
        network: &str,
        old_nick: &str,
        new_nick: &str,
        now: u64,
    ) {
        let old_key = cm.lower(old_nick);
        for (key, users) in self.channels.iter_mut() {
            if key.network != network {
                continue;
            }
            let rebuilt = match users.get_mut(&old_key) {
                Some(record) => {
                    record.departed_at = Some(now);
                    Hostmask::parse(&record.hostmask).map(|mask| mask.with_nick(new_nick))
                }
                None => None,
            };
            if let Some(hostmask) = rebuilt {
                users.insert(
                    cm.lower(new_nick),
                    UserRecord {
                        hostmask,
                        departed_at: None,
                    },
                );
            }
        }
    }

    /// The known hostmask for a nick, including soft-deleted records.
    pub fn lookup(&self, cm: Casemapping, network: &str, channel: &str, nick: &str) -> Option<&str> {
        self.channels
            .get(&Self::key(cm, network, channel))?
            .get(&cm.lower(nick))
            .map(|record| record.hostmask.as_str())
    }

    /// Marks every record of the network as departed.  Used on connection loss, where no QUIT
    /// lines will come.
    pub fn on_disconnect(&mut self, network: &str, now: u64) {
        for (key, users) in self.channels.iter_mut() {
            if key.network != network {
                continue;
            }
            for record in users.values_mut() {
                record.departed_at.get_or_insert(now);
            }
        }
    }

    /// Hard-deletes soft-deleted records older than the grace window.
    pub fn purge_expired(&mut self, now: u64, grace_period: u64) {
        for users in self.channels.values_mut() {
            users.retain(|_, record| match record.departed_at {
                Some(at) => now < at.saturating_add(grace_period),
                None => true,
            });
        }
        self.channels.retain(|_, users| !users.is_empty());
    }

    /// Drops a channel entirely.
    pub fn forget_channel(&mut self, cm: Casemapping, network: &str, channel: &str) {
        self.channels.remove(&Self::key(cm, network, channel));
    }

    /// Drops every channel of a network.
    pub fn forget_network(&mut self, network: &str) {
        self.channels.retain(|key, _| key.network != network);
    }
}
