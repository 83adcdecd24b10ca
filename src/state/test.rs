//! Testing utilities for `opaline::state`, plus end-to-end tests driving the tracker with raw
//! protocol lines.

use super::{Event, Tracker};
use crate::config::Settings;
use crate::{util, Error};
use opaline_tokens::Message;
use tokio::sync::mpsc;

pub type Outgoing = mpsc::UnboundedReceiver<String>;
pub type Events = mpsc::UnboundedReceiver<Event>;

pub fn simple_tracker() -> (Tracker, Events) {
    let _ = env_logger::builder().is_test(true).try_init();
    // no kick spacing, so tests need no clock control
    let settings = Settings {
        kick_spacing: 0,
        ..Settings::sample()
    };
    Tracker::new(settings)
}

pub async fn add_network(tracker: &Tracker, name: &str) -> Outgoing {
    let (queue, outgoing) = mpsc::unbounded_channel();
    tracker.network_joined(name, "me", queue).await;
    outgoing
}

pub async fn handle_message(tracker: &Tracker, network: &str, line: &str) {
    let msg = Message::parse(line).expect("bad message");
    tracker.handle_message(network, msg).await;
}

pub fn collect(queue: &mut Outgoing) -> Vec<String> {
    let mut res = Vec::new();
    while let Ok(line) = queue.try_recv() {
        res.push(line);
    }
    res
}

/// Fires the timer transitions as if the clock read `now`, for deadline tests.
pub async fn tick_at(tracker: &Tracker, now: u64) {
    tracker.0.lock().await.tick(now);
}

pub fn collect_events(queue: &mut Events) -> Vec<Event> {
    let mut res = Vec::new();
    while let Ok(event) = queue.try_recv() {
        res.push(event);
    }
    res
}

/// A tracker with one network whose server advertises +q, one tracked channel, and one known
/// user (`joe!~joe@joe.example`).
async fn tracked_channel() -> (Tracker, Outgoing, Events) {
    let (tracker, events) = simple_tracker();
    let mut outgoing = add_network(&tracker, "net1").await;
    handle_message(
        &tracker,
        "net1",
        ":hub 005 me CHANMODES=beIq,k,l,imnst PREFIX=(ov)@+ MODES=4 :are supported",
    )
    .await;
    tracker.watch("net1", "#chan").await;
    handle_message(
        &tracker,
        "net1",
        ":hub 352 me #chan ~joe joe.example hub joe H :0 Joe",
    )
    .await;
    // drop the WHO probe
    collect(&mut outgoing);
    (tracker, outgoing, events)
}

#[tokio::test]
async fn test_ban_by_nick_waits_for_op() {
    let (tracker, mut outgoing, mut events) = tracked_channel().await;

    tracker.ban("net1", "#chan", "joe").await;
    assert_eq!(collect(&mut outgoing), ["PRIVMSG ChanServ :OP #chan\r\n"]);

    handle_message(&tracker, "net1", ":ChanServ!s@s MODE #chan +o me").await;
    assert_eq!(collect(&mut outgoing), ["MODE #chan +b *!*@joe.example\r\n"]);

    // the server echoes the change; the cache learns the setter
    handle_message(&tracker, "net1", ":me!u@h MODE #chan +b *!*@joe.example").await;

    tracker.find_masks("net1", "#chan", 'b', "joe").await;
    assert_eq!(collect(&mut outgoing), ["MODE #chan +b\r\n"]);
    handle_message(&tracker, "net1", ":hub 367 me #chan *!*@joe.example me 100").await;
    handle_message(&tracker, "net1", ":hub 368 me #chan :End of ban list").await;

    let found = collect_events(&mut events);
    assert_eq!(found.len(), 1);
    match &found[0] {
        Event::Masks { entries, .. } => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].mask, "*!*@joe.example");
            assert_eq!(entries[0].setter.as_deref(), Some("me"));
            assert_eq!(entries[0].affected.as_deref(), Some("joe!~joe@joe.example"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_quiet_needs_advertisement() {
    let (tracker, events) = simple_tracker();
    let mut outgoing = add_network(&tracker, "net1").await;
    let mut events = events;

    // no 005 seen; the RFC baseline has no +q
    tracker.quiet("net1", "#chan", "joe!*@*").await;
    assert!(collect(&mut outgoing).is_empty());
    let failed = collect_events(&mut events);
    assert!(matches!(
        failed.as_slice(),
        [Event::Failed {
            error: Error::ProtocolMismatch { mode: 'q' },
            ..
        }]
    ));
}

#[tokio::test]
async fn test_unban_removes_matching_masks() {
    let (tracker, mut outgoing, mut events) = tracked_channel().await;

    tracker.unban("net1", "#chan", "joe").await;
    // the list has never been fetched, so the removal starts with a fetch
    assert_eq!(collect(&mut outgoing), ["MODE #chan +b\r\n"]);
    handle_message(&tracker, "net1", ":hub 367 me #chan *!*@joe.example op 100").await;
    handle_message(&tracker, "net1", ":hub 367 me #chan *!*@elsewhere op 101").await;
    handle_message(&tracker, "net1", ":hub 368 me #chan :End of ban list").await;

    assert_eq!(collect(&mut outgoing), ["PRIVMSG ChanServ :OP #chan\r\n"]);
    handle_message(&tracker, "net1", ":ChanServ!s@s MODE #chan +o me").await;
    assert_eq!(collect(&mut outgoing), ["MODE #chan -b *!*@joe.example\r\n"]);
    assert!(collect_events(&mut events).is_empty());
}

#[tokio::test]
async fn test_unban_without_match_reports() {
    let (tracker, mut outgoing, mut events) = tracked_channel().await;

    tracker.unban("net1", "#chan", "ghost!*@*").await;
    collect(&mut outgoing);
    handle_message(&tracker, "net1", ":hub 368 me #chan :End of ban list").await;

    assert!(collect(&mut outgoing).is_empty());
    let reported = collect_events(&mut events);
    assert!(matches!(
        reported.as_slice(),
        [Event::NoMatches { mode: 'b', .. }]
    ));
}

#[tokio::test]
async fn test_sync_masks_and_freshness() {
    let (tracker, mut outgoing, mut events) = tracked_channel().await;

    tracker.sync_masks("net1", "#chan", 'b').await;
    assert_eq!(collect(&mut outgoing), ["MODE #chan +b\r\n"]);
    handle_message(&tracker, "net1", ":hub 367 me #chan *!*@x.example op 100").await;
    handle_message(&tracker, "net1", ":hub 368 me #chan :End of ban list").await;
    assert!(matches!(
        collect_events(&mut events).as_slice(),
        [Event::Synced { count: 1, .. }]
    ));

    // fresh now: a second sync answers from the cache, nothing hits the wire
    tracker.sync_masks("net1", "#chan", 'b').await;
    assert!(collect(&mut outgoing).is_empty());
    assert!(matches!(
        collect_events(&mut events).as_slice(),
        [Event::Synced { count: 1, .. }]
    ));
}

#[tokio::test]
async fn test_kick_batch() {
    let (tracker, mut outgoing, _events) = tracked_channel().await;

    tracker.kick("net1", "#chan", &["joe", "jim"], "be nice").await;
    assert_eq!(collect(&mut outgoing), ["PRIVMSG ChanServ :OP #chan\r\n"]);
    handle_message(&tracker, "net1", ":ChanServ!s@s MODE #chan +o me").await;
    assert_eq!(
        collect(&mut outgoing),
        ["KICK #chan joe :be nice\r\n", "KICK #chan jim :be nice\r\n"]
    );
}

#[tokio::test]
async fn test_kickban_bans_then_kicks() {
    let (tracker, mut outgoing, _events) = tracked_channel().await;

    tracker.kickban("net1", "#chan", "joe", "bye").await;
    assert_eq!(collect(&mut outgoing), ["PRIVMSG ChanServ :OP #chan\r\n"]);
    handle_message(&tracker, "net1", ":ChanServ!s@s MODE #chan +o me").await;
    assert_eq!(
        collect(&mut outgoing),
        ["MODE #chan +b *!*@joe.example\r\n", "KICK #chan joe :bye\r\n"]
    );
}

#[tokio::test]
async fn test_not_operator_aborts_batch() {
    let (tracker, mut outgoing, mut events) = tracked_channel().await;

    tracker.ban("net1", "#chan", "joe").await;
    collect(&mut outgoing);
    handle_message(&tracker, "net1", ":hub 482 me #chan :You're not channel operator").await;

    assert!(matches!(
        collect_events(&mut events).as_slice(),
        [Event::Failed {
            error: Error::NotOperator { .. },
            ..
        }]
    ));
    // a late grant finds nothing left to send
    handle_message(&tracker, "net1", ":ChanServ!s@s MODE #chan +o me").await;
    assert!(collect(&mut outgoing).is_empty());
}

#[tokio::test]
async fn test_auto_deop_after_batch_drains() {
    let (tracker, mut outgoing, _events) = tracked_channel().await;

    tracker.ban("net1", "#chan", "joe").await;
    handle_message(&tracker, "net1", ":ChanServ!s@s MODE #chan +o me").await;
    collect(&mut outgoing);

    // the grant is not due for return yet
    tick_at(&tracker, util::time()).await;
    assert!(collect(&mut outgoing).is_empty());

    // sample settings give op back after 180 seconds
    tick_at(&tracker, util::time() + 200).await;
    assert_eq!(collect(&mut outgoing), ["MODE #chan -o me\r\n"]);

    // and only once
    tick_at(&tracker, util::time() + 400).await;
    assert!(collect(&mut outgoing).is_empty());
}

#[tokio::test]
async fn test_unsolicited_op_grant_is_kept() {
    let (tracker, mut outgoing, _events) = tracked_channel().await;

    // another operator ops us without us asking
    handle_message(&tracker, "net1", ":op!o@h MODE #chan +o me").await;
    tick_at(&tracker, util::time() + 100_000).await;
    assert!(collect(&mut outgoing).is_empty());
}

#[tokio::test]
async fn test_op_grant_timeout_reports() {
    let (tracker, mut outgoing, mut events) = tracked_channel().await;

    tracker.ban("net1", "#chan", "joe").await;
    assert_eq!(collect(&mut outgoing), ["PRIVMSG ChanServ :OP #chan\r\n"]);

    // sample settings wait 30 seconds for the grant
    tick_at(&tracker, util::time() + 100).await;
    assert!(matches!(
        collect_events(&mut events).as_slice(),
        [Event::Failed {
            error: Error::OpGrantTimeout { .. },
            ..
        }]
    ));
    // a late grant finds nothing left to send
    handle_message(&tracker, "net1", ":ChanServ!s@s MODE #chan +o me").await;
    assert!(collect(&mut outgoing).is_empty());
}

#[tokio::test]
async fn test_truncated_line_reports_malformed() {
    let (tracker, mut outgoing, mut events) = tracked_channel().await;

    handle_message(&tracker, "net1", ":op!o@h KICK #chan").await;
    assert!(collect(&mut outgoing).is_empty());
    assert!(matches!(
        collect_events(&mut events).as_slice(),
        [Event::Failed {
            error: Error::MalformedLine,
            ..
        }]
    ));
}

#[tokio::test]
async fn test_nick_change_keeps_user_bannable() {
    let (tracker, mut outgoing, mut events) = tracked_channel().await;

    handle_message(&tracker, "net1", ":joe!~joe@joe.example NICK joey").await;
    tracker.ban("net1", "#chan", "joey").await;

    // the op request went out, so the nick resolved
    assert_eq!(collect(&mut outgoing), ["PRIVMSG ChanServ :OP #chan\r\n"]);
    assert!(collect_events(&mut events).is_empty());
}

#[tokio::test]
async fn test_unknown_nick_fails() {
    let (tracker, mut outgoing, mut events) = tracked_channel().await;

    tracker.ban("net1", "#chan", "ghost").await;
    assert!(collect(&mut outgoing).is_empty());
    assert!(matches!(
        collect_events(&mut events).as_slice(),
        [Event::Failed {
            error: Error::NoSuchUser { .. },
            ..
        }]
    ));
}

#[tokio::test]
async fn test_connection_reset_aborts_fetches() {
    let (tracker, mut outgoing, mut events) = tracked_channel().await;

    tracker.find_masks("net1", "#chan", 'b', "joe").await;
    assert_eq!(collect(&mut outgoing), ["MODE #chan +b\r\n"]);

    tracker.connection_reset("net1").await;
    assert!(matches!(
        collect_events(&mut events).as_slice(),
        [Event::Failed {
            error: Error::ConnectionReset,
            ..
        }]
    ));

    // capabilities are renegotiated from scratch on the next registration
    tracker.quiet("net1", "#chan", "joe!*@*").await;
    assert!(matches!(
        collect_events(&mut events).as_slice(),
        [Event::Failed {
            error: Error::ProtocolMismatch { mode: 'q' },
            ..
        }]
    ));
}

#[tokio::test]
async fn test_mode_echo_updates_cache() {
    let (tracker, mut outgoing, mut events) = tracked_channel().await;

    handle_message(&tracker, "net1", ":op!o@h MODE #chan +bb *!*@one.example *!*@two.example").await;
    handle_message(&tracker, "net1", ":op!o@h MODE #chan -b *!*@one.example").await;

    tracker.sync_masks("net1", "#chan", 'b').await;
    collect(&mut outgoing);
    handle_message(&tracker, "net1", ":hub 367 me #chan *!*@two.example op 100").await;
    handle_message(&tracker, "net1", ":hub 368 me #chan :End of ban list").await;
    collect_events(&mut events);

    tracker.find_masks("net1", "#chan", 'b', "*two*").await;
    let found = collect_events(&mut events);
    match found.as_slice() {
        [Event::Masks { entries, .. }] => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].mask, "*!*@two.example");
            // the live MODE had a setter before the fetch confirmed it
            assert_eq!(entries[0].setter.as_deref(), Some("op"));
        }
        other => panic!("unexpected events {:?}", other),
    }
}
