//! The operator commands an embedding client invokes.
//!
//! Every command that needs channel-operator status goes through the network's command queue:
//! the queue asks for op first, drains once the grant is observed, and reports a failure event
//! if it never is.  Nothing here writes to the mask cache on its own authority; the server's
//! echoed MODE lines do that in `wire`.

use super::{Event, Network, SyncCallback, TrackerInner};
use crate::mask::ban_mask_for;
use crate::queue::QueuedCommand;
use crate::sync::Outcome;
use crate::{util, Error};
use opaline_tokens::{Buffer, Casemapping, Command};

/// Batches membership or mask changes into MODE lines, `max` changes per line.
fn mode_lines(channel: &str, value: bool, letter: char, params: &[String], max: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for chunk in params.chunks(max.max(1)) {
        let mut buf = Buffer::new();
        {
            let mut msg = buf.message("", Command::Mode).param(channel);
            {
                let raw = msg.raw_param();
                raw.push(if value { '+' } else { '-' });
                for _ in chunk {
                    raw.push(letter);
                }
            }
            let mut msg = msg;
            for param in chunk {
                msg = msg.param(param);
            }
        }
        lines.push(buf.build());
    }
    lines
}

fn raw(line: String) -> QueuedCommand {
    QueuedCommand::Raw { line, delay: 0 }
}

impl TrackerInner {
    /// Starts tracking a channel and asks WHO to learn everyone's hostmask.
    pub fn watch(&mut self, network: &str, channel: &str, now: u64) {
        let mut buf = Buffer::new();
        buf.message("", Command::Who).param(channel);
        let commands = vec![
            QueuedCommand::Watch {
                channel: channel.to_owned(),
            },
            raw(buf.build()),
        ];
        self.enqueue_and_run(network, commands, now);
    }

    /// Stops tracking a channel and drops its cached state.
    pub fn unwatch(&mut self, network: &str, channel: &str) {
        let (cm, list_letters) = {
            let net = match self.networks.get_mut(network) {
                Some(net) => net,
                None => return,
            };
            let key = net.cm().lower(channel);
            net.tracked.remove(&key);
            net.ops.remove(&key);
            (net.cm(), net.caps.chanmodes.list.clone())
        };
        self.presence.forget_channel(cm, network, channel);
        for letter in list_letters.chars() {
            self.masks.remove_channel(cm, network, channel, letter);
        }
    }

    /// Adds a mask (ban, quiet, ...).  `target` is a nickname, a hostmask or a mask pattern.
    pub fn cmd_mask(&mut self, network: &str, channel: &str, letter: char, target: &str, now: u64) {
        let (me, cm, supported) = match self.networks.get(network) {
            Some(net) => (net.me.clone(), net.cm(), net.caps.has_list_mode(letter)),
            None => return,
        };
        if !supported {
            self.fail(network, Error::ProtocolMismatch { mode: letter });
            return;
        }
        let (mask, affected) = match self.resolve_mask(network, channel, target) {
            Ok(resolved) => resolved,
            Err(error) => {
                self.fail(network, error);
                return;
            }
        };
        // provisional entry; the echoed MODE fills the setter and timestamp
        self.masks
            .add(cm, network, channel, letter, &mask, None, 0, affected.as_deref());

        let commands = vec![
            self.op_request(channel, &me),
            raw(mode_lines(channel, true, letter, &[mask], 1).remove(0)),
        ];
        self.enqueue_and_run(network, commands, now);
    }

    /// Removes the masks matching `target`, refreshing the list first when it is stale.
    pub fn cmd_unmask(&mut self, network: &str, channel: &str, letter: char, target: &str, now: u64) {
        let network_name = network.to_owned();
        let chan = channel.to_owned();
        let target = target.to_owned();
        let callback: SyncCallback = Box::new(move |state, outcome| match outcome {
            Outcome::Fresh | Outcome::Synced(_) => {
                state.remove_matching(&network_name, &chan, letter, &target);
            }
            Outcome::Unsupported => {
                state.fail(&network_name, Error::ProtocolMismatch { mode: letter });
            }
            Outcome::Aborted => state.fail(&network_name, Error::ConnectionReset),
        });
        self.request_sync(network, channel, letter, now, callback);
    }

    fn remove_matching(&mut self, network: &str, channel: &str, letter: char, query: &str) {
        let now = util::time();
        let (me, cm, max) = match self.networks.get(network) {
            Some(net) => (net.me.clone(), net.cm(), net.caps.max_modes),
            None => return,
        };
        let matching: Vec<String> = {
            let TrackerInner { masks, presence, .. } = self;
            masks
                .search(cm, network, channel, letter, query, presence, now)
                .iter()
                .map(|entry| entry.mask.clone())
                .collect()
        };
        if matching.is_empty() {
            self.emit(Event::NoMatches {
                network: network.to_owned(),
                channel: channel.to_owned(),
                mode: letter,
                query: query.to_owned(),
            });
            return;
        }
        let mut commands = vec![self.op_request(channel, &me)];
        commands.extend(
            mode_lines(channel, false, letter, &matching, max)
                .into_iter()
                .map(raw),
        );
        self.enqueue_and_run(network, commands, now);
    }

    /// Kicks users, spacing the lines to stay under server flood limits.
    pub fn cmd_kick(&mut self, network: &str, channel: &str, nicks: &[&str], reason: &str, now: u64) {
        let me = match self.networks.get(network) {
            Some(net) => net.me.clone(),
            None => return,
        };
        if nicks.is_empty() {
            return;
        }
        let mut commands = vec![self.op_request(channel, &me)];
        for (i, nick) in nicks.iter().enumerate() {
            let delay = if i == 0 { 0 } else { self.settings.kick_spacing };
            commands.push(QueuedCommand::Raw {
                line: kick_line(channel, nick, reason),
                delay,
            });
        }
        self.enqueue_and_run(network, commands, now);
    }

    /// Bans a user then kicks them, in one batch.
    pub fn cmd_kickban(
        &mut self,
        network: &str,
        channel: &str,
        nick: &str,
        reason: &str,
        now: u64,
    ) {
        let (me, cm, supported) = match self.networks.get(network) {
            Some(net) => (net.me.clone(), net.cm(), net.caps.has_list_mode('b')),
            None => return,
        };
        if !supported {
            self.fail(network, Error::ProtocolMismatch { mode: 'b' });
            return;
        }
        let (mask, affected) = match self.resolve_mask(network, channel, nick) {
            Ok(resolved) => resolved,
            Err(error) => {
                self.fail(network, error);
                return;
            }
        };
        self.masks
            .add(cm, network, channel, 'b', &mask, None, 0, affected.as_deref());

        let commands = vec![
            self.op_request(channel, &me),
            raw(mode_lines(channel, true, 'b', &[mask], 1).remove(0)),
            raw(kick_line(channel, nick, reason)),
        ];
        self.enqueue_and_run(network, commands, now);
    }

    /// Grants or removes a membership mode (op, voice) for users, batched per the server's
    /// MODES limit.
    pub fn cmd_member(
        &mut self,
        network: &str,
        channel: &str,
        value: bool,
        letter: char,
        nicks: &[&str],
        now: u64,
    ) {
        let (me, max) = match self.networks.get(network) {
            Some(net) => (net.me.clone(), net.caps.max_modes),
            None => return,
        };
        if nicks.is_empty() {
            return;
        }
        let params: Vec<String> = nicks.iter().map(|nick| (*nick).to_owned()).collect();
        let mut commands = vec![self.op_request(channel, &me)];
        commands.extend(
            mode_lines(channel, value, letter, &params, max)
                .into_iter()
                .map(raw),
        );
        self.enqueue_and_run(network, commands, now);
    }

    /// Refreshes a mask list; completion arrives as [`Event::Synced`].
    pub fn sync_masks(&mut self, network: &str, channel: &str, mode: char, now: u64) {
        let network_name = network.to_owned();
        let chan = channel.to_owned();
        let callback: SyncCallback = Box::new(move |state, outcome| match outcome {
            Outcome::Synced(count) => state.emit(Event::Synced {
                network: network_name.clone(),
                channel: chan.clone(),
                mode,
                count,
            }),
            Outcome::Fresh => {
                let count = state
                    .networks
                    .get(&network_name)
                    .and_then(|net| state.masks.get(net.cm(), &network_name, &chan, mode))
                    .map_or(0, |list| list.len());
                state.emit(Event::Synced {
                    network: network_name.clone(),
                    channel: chan.clone(),
                    mode,
                    count,
                });
            }
            Outcome::Unsupported => {
                state.fail(&network_name, Error::ProtocolMismatch { mode });
            }
            Outcome::Aborted => state.fail(&network_name, Error::ConnectionReset),
        });
        self.request_sync(network, channel, mode, now, callback);
    }

    /// Looks up the masks affecting `query`; the result arrives as [`Event::Masks`].
    pub fn find_masks(&mut self, network: &str, channel: &str, mode: char, query: &str, now: u64) {
        let network_name = network.to_owned();
        let chan = channel.to_owned();
        let query = query.to_owned();
        let callback: SyncCallback = Box::new(move |state, outcome| match outcome {
            Outcome::Fresh | Outcome::Synced(_) => {
                let now = util::time();
                let cm = state
                    .networks
                    .get(&network_name)
                    .map_or(Casemapping::default(), Network::cm);
                let entries: Vec<_> = {
                    let TrackerInner { masks, presence, .. } = state;
                    masks
                        .search(cm, &network_name, &chan, mode, &query, presence, now)
                        .into_iter()
                        .cloned()
                        .collect()
                };
                state.emit(Event::Masks {
                    network: network_name.clone(),
                    channel: chan.clone(),
                    mode,
                    query: query.clone(),
                    entries,
                });
            }
            Outcome::Unsupported => {
                state.fail(&network_name, Error::ProtocolMismatch { mode });
            }
            Outcome::Aborted => state.fail(&network_name, Error::ConnectionReset),
        });
        self.request_sync(network, channel, mode, now, callback);
    }

    /// Resolves a target to a mask: patterns and hostmasks pass through, nicknames go through
    /// the presence cache and become `*!*@host`.
    fn resolve_mask(
        &self,
        network: &str,
        channel: &str,
        target: &str,
    ) -> crate::Result<(String, Option<String>)> {
        if target.contains('!') || target.contains('@') || target.contains('*') || target.contains('?') {
            return Ok((target.to_owned(), None));
        }
        let cm = self
            .networks
            .get(network)
            .map_or(Casemapping::default(), Network::cm);
        match self.presence.lookup(cm, network, channel, target) {
            Some(hostmask) => Ok((ban_mask_for(hostmask), Some(hostmask.to_owned()))),
            None => Err(Error::NoSuchUser {
                nick: target.to_owned(),
            }),
        }
    }

    fn op_request(&self, channel: &str, me: &str) -> QueuedCommand {
        let mut request = self
            .settings
            .op_request_command
            .replace("{channel}", channel)
            .replace("{nick}", me);
        request.push_str("\r\n");
        QueuedCommand::RequestOp {
            channel: channel.to_owned(),
            request,
        }
    }

    fn enqueue_and_run(&mut self, network: &str, commands: Vec<QueuedCommand>, now: u64) {
        let error = {
            let net = match self.networks.get_mut(network) {
                Some(net) => net,
                None => return,
            };
            let mut failed = None;
            for command in commands {
                if let Err(error) = net.commands.enqueue(command) {
                    failed = Some(error);
                    break;
                }
            }
            if failed.is_none() {
                net.run_queue(now);
            }
            failed
        };
        if let Some(error) = error {
            self.fail(network, error);
        }
    }
}

fn kick_line(channel: &str, nick: &str, reason: &str) -> String {
    let mut buf = Buffer::new();
    let msg = buf.message("", Command::Kick).param(channel).param(nick);
    if reason.is_empty() {
        drop(msg);
    } else {
        msg.trailing_param(reason);
    }
    buf.build()
}
