//! Handlers for inbound server messages.
//!
//! Everything here is best-effort: a line the tracker cannot make sense of is logged and
//! skipped, never an abort.  The server is authoritative; these handlers only mirror what it
//! says into the caches.

use super::TrackerInner;
use crate::queue::RunState;
use crate::Error;
use opaline_tokens::mode::{self, ModeChange};
use opaline_tokens::{rpl, Message};

fn is_channel_name(target: &str) -> bool {
    target.starts_with(|c| "#&+!".contains(c))
}

impl TrackerInner {
    pub(super) fn on_join(&mut self, network: &str, msg: &Message<'_>) {
        let TrackerInner { networks, presence, .. } = self;
        let net = match networks.get(network) {
            Some(net) => net,
            None => return,
        };
        let prefix = match msg.prefix {
            Some(prefix) => prefix,
            None => return,
        };
        let channel = msg.params[0];
        if net.is_tracked(channel) {
            presence.on_join(net.cm(), network, channel, prefix);
        }
    }

    pub(super) fn on_part(&mut self, network: &str, msg: &Message<'_>, now: u64) {
        let nick = match msg.prefix_nick() {
            Some(nick) => nick,
            None => return,
        };
        let channel = msg.params[0];
        let TrackerInner { networks, presence, .. } = self;
        let net = match networks.get_mut(network) {
            Some(net) => net,
            None => return,
        };
        if net.is_me(nick) {
            // we stopped observing; mask lists stay and go stale on their own
            log::debug!("{}: left {}", network, channel);
            let key = net.cm().lower(channel);
            net.tracked.remove(&key);
            net.ops.remove(&key);
            presence.forget_channel(net.cm(), network, channel);
        } else if net.is_tracked(channel) {
            presence.on_part(net.cm(), network, channel, nick, now);
        }
    }

    pub(super) fn on_quit(&mut self, network: &str, msg: &Message<'_>, now: u64) {
        let nick = match msg.prefix_nick() {
            Some(nick) => nick,
            None => return,
        };
        let TrackerInner { networks, presence, .. } = self;
        let net = match networks.get_mut(network) {
            Some(net) => net,
            None => return,
        };
        if net.is_me(nick) {
            return;
        }
        presence.on_quit(net.cm(), network, nick, now);
        let key = net.cm().lower(nick);
        for nicks in net.ops.values_mut() {
            nicks.remove(&key);
        }
    }

    pub(super) fn on_nick(&mut self, network: &str, msg: &Message<'_>, now: u64) {
        let old = match msg.prefix_nick() {
            Some(nick) => nick,
            None => return,
        };
        let new = msg.params[0];
        let TrackerInner { networks, presence, .. } = self;
        let net = match networks.get_mut(network) {
            Some(net) => net,
            None => return,
        };
        presence.on_nick_change(net.cm(), network, old, new, now);
        let old_key = net.cm().lower(old);
        let new_key = net.cm().lower(new);
        for nicks in net.ops.values_mut() {
            if nicks.remove(&old_key) {
                nicks.insert(new_key.clone());
            }
        }
        if net.is_me(old) {
            net.me = new.to_owned();
        }
    }

    pub(super) fn on_kick(&mut self, network: &str, msg: &Message<'_>, now: u64) {
        let channel = msg.params[0];
        let victim = msg.params[1];
        let TrackerInner { networks, presence, .. } = self;
        let net = match networks.get_mut(network) {
            Some(net) => net,
            None => return,
        };
        if net.is_me(victim) {
            log::debug!("{}: kicked from {}", network, channel);
            let key = net.cm().lower(channel);
            net.tracked.remove(&key);
            net.ops.remove(&key);
            presence.forget_channel(net.cm(), network, channel);
        } else if net.is_tracked(channel) {
            presence.on_part(net.cm(), network, channel, victim, now);
        }
    }

    pub(super) fn on_mode(&mut self, network: &str, msg: &Message<'_>, now: u64) {
        let channel = msg.params[0];
        if msg.num_params < 2 || !is_channel_name(channel) {
            return;
        }
        let modes = msg.params[1];
        let args = &msg.params[2..msg.num_params];
        let setter = msg.prefix_nick();

        let TrackerInner { networks, masks, settings, .. } = self;
        let net = match networks.get_mut(network) {
            Some(net) => net,
            None => return,
        };
        let cm = net.cm();
        let chanmodes = net.caps.chanmodes.clone();

        for change in mode::channel_query(&chanmodes, modes, args) {
            match change {
                Ok(ModeChange { value, letter, param: Some(mask) })
                    if chanmodes.is_list(letter) =>
                {
                    if value {
                        masks.add(cm, network, channel, letter, mask, setter, now, None);
                    } else {
                        masks.remove(cm, network, channel, letter, mask);
                    }
                }
                Ok(ModeChange { value, letter: 'o', param: Some(nick) }) => {
                    let chan_key = cm.lower(channel);
                    let nick_key = cm.lower(nick);
                    if value {
                        net.ops.entry(chan_key).or_default().insert(nick_key);
                        if net.is_me(nick) {
                            let asked = matches!(
                                net.commands.state(),
                                RunState::BlockedOnOp { channel: wanted, .. }
                                    if cm.eq(wanted, channel)
                            );
                            if asked {
                                net.resume_queue(now);
                                if let Some(after) = settings.auto_deop_after {
                                    net.pending_deop =
                                        Some((channel.to_owned(), now.saturating_add(after)));
                                }
                            }
                        }
                    } else {
                        if let Some(nicks) = net.ops.get_mut(&chan_key) {
                            nicks.remove(&nick_key);
                        }
                        if net.is_me(nick) {
                            let ours = matches!(
                                &net.pending_deop,
                                Some((wanted, _)) if cm.eq(wanted, channel)
                            );
                            if ours {
                                net.pending_deop = None;
                            }
                        }
                    }
                }
                Ok(_) => {}
                Err(mode::Error::Unknown(letter, _)) => {
                    log::debug!("{}: unknown mode {} in {:?}, skipped", network, letter, modes);
                }
                Err(mode::Error::MissingParam(letter, _)) => {
                    // arguments are misaligned from here on
                    log::warn!("{}: mode {} missing its argument in {:?}", network, letter, modes);
                    return;
                }
            }
        }
    }

    pub(super) fn on_reply(&mut self, network: &str, numeric: u16, msg: &Message<'_>, now: u64) {
        match numeric {
            rpl::ISUPPORT => self.on_isupport(network, msg),
            rpl::BANLIST | rpl::QUIETLIST | rpl::INVITELIST | rpl::EXCEPTLIST => {
                let TrackerInner { networks, sync, .. } = self;
                if let Some(net) = networks.get(network) {
                    sync.on_list_line(network, &net.caps, msg);
                }
            }
            rpl::ENDOFBANLIST
            | rpl::ENDOFQUIETLIST
            | rpl::ENDOFINVITELIST
            | rpl::ENDOFEXCEPTLIST => {
                let done = {
                    let TrackerInner { networks, masks, sync, .. } = &mut *self;
                    let net = match networks.get(network) {
                        Some(net) => net,
                        None => return,
                    };
                    let queue = net.queue.clone();
                    sync.on_list_end(network, &net.caps, msg, masks, now, &mut |line| {
                        if queue.send(line).is_err() {
                            log::warn!("outgoing queue closed, line dropped");
                        }
                    })
                };
                for (callback, outcome) in done {
                    callback(self, outcome);
                }
            }
            rpl::WHOREPLY => self.on_who_reply(network, msg),
            rpl::NAMREPLY => self.on_names_reply(network, msg),
            rpl::ERR_CHANOPRIVSNEEDED => self.on_not_operator(network, msg),
            _ => {}
        }
    }

    fn on_isupport(&mut self, network: &str, msg: &Message<'_>) {
        if msg.num_params < 2 {
            return;
        }
        if let Some(net) = self.networks.get_mut(network) {
            // skip the client name and the trailing "are supported" text
            net.caps.update(&msg.params[1..msg.num_params - 1]);
        }
    }

    /// Backfills presence from a WHO reply: `<client> <channel> <user> <host> <server> <nick>
    /// <flags> :<hops> <realname>`.
    fn on_who_reply(&mut self, network: &str, msg: &Message<'_>) {
        if msg.num_params < 7 {
            return;
        }
        let channel = msg.params[1];
        let nick = msg.params[5];
        let flags = msg.params[6];
        let hostmask = format!("{}!{}@{}", nick, msg.params[2], msg.params[3]);

        let TrackerInner { networks, presence, .. } = self;
        let net = match networks.get_mut(network) {
            Some(net) => net,
            None => return,
        };
        if !net.is_tracked(channel) {
            return;
        }
        presence.on_join(net.cm(), network, channel, &hostmask);
        if flags.contains('@') {
            let chan_key = net.cm().lower(channel);
            let nick_key = net.cm().lower(nick);
            net.ops.entry(chan_key).or_default().insert(nick_key);
        }
    }

    /// Learns operator status from a NAMES reply: `<client> <symbol> <channel> :<names>`.
    ///
    /// NAMES carries no hostmasks, so presence is left to WHO; only the `@` prefixes are read.
    fn on_names_reply(&mut self, network: &str, msg: &Message<'_>) {
        if msg.num_params < 4 {
            return;
        }
        let channel = msg.params[2];
        let net = match self.networks.get_mut(network) {
            Some(net) => net,
            None => return,
        };
        if !net.is_tracked(channel) {
            return;
        }
        let chan_key = net.cm().lower(channel);
        for name in msg.params[3].split_whitespace() {
            let nick = name.trim_start_matches(|c| "~&@%+".contains(c));
            if name[..name.len() - nick.len()].contains('@') && !nick.is_empty() {
                let nick_key = net.cm().lower(nick);
                net.ops.entry(chan_key.clone()).or_default().insert(nick_key);
            }
        }
    }

    fn on_not_operator(&mut self, network: &str, msg: &Message<'_>) {
        if msg.num_params < 2 {
            return;
        }
        let channel = msg.params[1].to_owned();
        if let Some(net) = self.networks.get_mut(network) {
            // a pending op wait for this channel will never be granted
            let blocked = matches!(
                net.commands.state(),
                RunState::BlockedOnOp { channel: wanted, .. }
                    if net.cm().eq(wanted, &channel)
            );
            if blocked {
                let _ = net.commands.timeout();
            }
        }
        self.fail(network, Error::NotOperator { channel });
    }
}
