//! The client-side mirror of server ban/quiet state.
//!
//! One `MaskList` per (network, channel, mode letter), populated from live MODE changes and from
//! full list fetches driven by `sync`.  Lookups go through glob patterns compiled to regexes,
//! cached per pattern since operators tend to poke at the same masks repeatedly.

use crate::presence::PresenceCache;
use opaline_tokens::Casemapping;
use regex::Regex;
use std::collections::HashMap;

/// One ban/quiet mask applied to a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaskEntry {
    /// The glob pattern, e.g. `*!*@joe.example`.
    pub mask: String,

    /// Who set the mask, when known.
    pub setter: Option<String>,

    /// Unix timestamp of when the mask was set; 0 when unknown.
    pub set_at: u64,

    /// Hostmask of a user the mask was aimed at, when the mask was built by us.
    pub affected: Option<String>,
}

impl MaskEntry {
    pub fn new(mask: &str) -> Self {
        Self {
            mask: mask.to_owned(),
            setter: None,
            set_at: 0,
            affected: None,
        }
    }
}

/// The masks of one (network, channel, mode), in insertion order.
#[derive(Default)]
pub struct MaskList {
    entries: Vec<MaskEntry>,
    last_synced_at: Option<u64>,
}

impl MaskList {
    pub fn iter(&self) -> impl Iterator<Item = &MaskEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// When the last complete fetch finished.  `None` until one has.
    pub fn last_synced_at(&self) -> Option<u64> {
        self.last_synced_at
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct ListKey {
    network: String,
    channel: String,
    mode: char,
}

/// All mask lists, across networks and channels.
#[derive(Default)]
pub struct MaskCache {
    lists: HashMap<ListKey, MaskList>,
    matcher: Matcher,
}

impl MaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(cm: Casemapping, network: &str, channel: &str, mode: char) -> ListKey {
        ListKey {
            network: network.to_owned(),
            channel: cm.lower(channel),
            mode,
        }
    }

    /// Inserts a mask, or completes the metadata of an existing one.
    ///
    /// Re-adding never duplicates: an existing entry keeps its populated fields and only fills
    /// the empty ones, so a live `+b` seen after a list fetch cannot erase the setter the fetch
    /// reported (and the other way around).
    pub fn add(
        &mut self,
        cm: Casemapping,
        network: &str,
        channel: &str,
        mode: char,
        mask: &str,
        setter: Option<&str>,
        set_at: u64,
        affected: Option<&str>,
    ) {
        let list = self
            .lists
            .entry(Self::key(cm, network, channel, mode))
            .or_default();
        let lowered = cm.lower(mask);
        if let Some(entry) = list
            .entries
            .iter_mut()
            .find(|entry| cm.lower(&entry.mask) == lowered)
        {
            merge_field(&mut entry.setter, setter, mask, "setter");
            merge_field(&mut entry.affected, affected, mask, "affected");
            if entry.set_at == 0 {
                entry.set_at = set_at;
            }
            return;
        }
        list.entries.push(MaskEntry {
            mask: mask.to_owned(),
            setter: setter.map(str::to_owned),
            set_at,
            affected: affected.map(str::to_owned),
        });
    }

    /// Removes a mask.  No-op when absent.
    pub fn remove(&mut self, cm: Casemapping, network: &str, channel: &str, mode: char, mask: &str) {
        if let Some(list) = self.lists.get_mut(&Self::key(cm, network, channel, mode)) {
            let lowered = cm.lower(mask);
            list.entries.retain(|entry| cm.lower(&entry.mask) != lowered);
        }
    }

    /// Drops a whole list, e.g. when the channel is no longer tracked.
    pub fn remove_channel(&mut self, cm: Casemapping, network: &str, channel: &str, mode: char) {
        self.lists.remove(&Self::key(cm, network, channel, mode));
    }

    /// Drops every list of a network.
    pub fn remove_network(&mut self, network: &str) {
        self.lists.retain(|key, _| key.network != network);
    }

    pub fn get(
        &self,
        cm: Casemapping,
        network: &str,
        channel: &str,
        mode: char,
    ) -> Option<&MaskList> {
        self.lists.get(&Self::key(cm, network, channel, mode))
    }

    /// True when the list is absent or its last complete fetch is older than the window.
    pub fn is_stale(
        &self,
        cm: Casemapping,
        network: &str,
        channel: &str,
        mode: char,
        window: u64,
        now: u64,
    ) -> bool {
        match self
            .get(cm, network, channel, mode)
            .and_then(MaskList::last_synced_at)
        {
            Some(synced) => window < now.saturating_sub(synced),
            None => true,
        }
    }

    /// Replaces a list's membership with the result of a complete fetch.
    ///
    /// Masks absent from the fetch are dropped (the server is authoritative); surviving entries
    /// keep locally-known metadata the fetch did not carry.
    pub fn commit_synced(
        &mut self,
        cm: Casemapping,
        network: &str,
        channel: &str,
        mode: char,
        staged: Vec<MaskEntry>,
        now: u64,
    ) {
        let list = self
            .lists
            .entry(Self::key(cm, network, channel, mode))
            .or_default();
        let mut old = std::mem::take(&mut list.entries);
        for mut entry in staged {
            let lowered = cm.lower(&entry.mask);
            if let Some(pos) = old.iter().position(|e| cm.lower(&e.mask) == lowered) {
                let prev = old.swap_remove(pos);
                if entry.setter.is_none() {
                    entry.setter = prev.setter;
                }
                if entry.affected.is_none() {
                    entry.affected = prev.affected;
                }
                if entry.set_at == 0 {
                    entry.set_at = prev.set_at;
                }
            }
            list.entries.push(entry);
        }
        for gone in &old {
            log::debug!(
                "{}: {} +{}: mask {:?} absent from fetch, dropped",
                network,
                channel,
                mode,
                gone.mask
            );
        }
        list.last_synced_at = Some(now);
    }

    /// Finds the masks affecting a query.
    ///
    /// The query is either a nickname (resolved to a hostmask through the presence cache), a
    /// hostmask (matched against the stored patterns), or a glob pattern (matched against the
    /// stored mask strings).  All comparisons fold through the network's casemapping.
    pub fn search(
        &mut self,
        cm: Casemapping,
        network: &str,
        channel: &str,
        mode: char,
        query: &str,
        presence: &PresenceCache,
        now: u64,
    ) -> Vec<&MaskEntry> {
        let MaskCache { lists, matcher } = self;
        let list = match lists.get(&Self::key(cm, network, channel, mode)) {
            Some(list) => list,
            None => return Vec::new(),
        };

        if query.contains('*') || query.contains('?') {
            return list
                .entries
                .iter()
                .filter(|entry| matcher.matches(cm, query, &cm.lower(&entry.mask), now))
                .collect();
        }

        let hostmask = if query.contains('!') || query.contains('@') {
            query.to_owned()
        } else {
            match presence.lookup(cm, network, channel, query) {
                Some(hostmask) => hostmask.to_owned(),
                None => {
                    log::debug!("{}: no hostmask known for {:?}", network, query);
                    return Vec::new();
                }
            }
        };
        let subject = cm.lower(&hostmask);
        list.entries
            .iter()
            .filter(|entry| matcher.matches(cm, &entry.mask, &subject, now))
            .collect()
    }

    /// Drops compiled patterns unused for `idle` seconds.
    pub fn sweep(&mut self, now: u64, idle: u64) {
        self.matcher.sweep(now, idle);
    }
}

fn merge_field(existing: &mut Option<String>, new: Option<&str>, mask: &str, what: &str) {
    match (&existing, new) {
        (None, Some(value)) => *existing = Some(value.to_owned()),
        (Some(old), Some(value)) if old.as_str() != value => {
            log::debug!(
                "mask {:?}: conflicting {} {:?} vs {:?}, keeping the first",
                mask,
                what,
                old,
                value
            );
        }
        _ => {}
    }
}

/// The default ban mask for a user: `*!*@host`.
///
/// Falls back to `nick!*@*` when only a nick is known.
pub fn ban_mask_for(hostmask: &str) -> String {
    match hostmask.rfind('@') {
        Some(at) if at + 1 < hostmask.len() => format!("*!*@{}", &hostmask[at + 1..]),
        _ => format!("{}!*@*", hostmask),
    }
}

/// Glob patterns compiled to anchored regexes, cached by folded pattern string.
#[derive(Default)]
struct Matcher {
    patterns: HashMap<String, CachedPattern>,
}

struct CachedPattern {
    regex: Regex,
    last_used: u64,
}

impl Matcher {
    /// Whether `pattern` matches `subject`.  The subject must already be folded through the
    /// casemapping; the pattern is folded here so the cache key is canonical.
    fn matches(&mut self, cm: Casemapping, pattern: &str, subject: &str, now: u64) -> bool {
        use std::collections::hash_map::Entry;

        let cached = match self.patterns.entry(cm.lower(pattern)) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(slot) => {
                let src = glob_regex_src(slot.key());
                match Regex::new(&src) {
                    Ok(regex) => slot.insert(CachedPattern {
                        regex,
                        last_used: now,
                    }),
                    Err(err) => {
                        log::error!("failed to compile pattern {:?}: {}", pattern, err);
                        return false;
                    }
                }
            }
        };
        cached.last_used = now;
        cached.regex.is_match(subject)
    }

    fn sweep(&mut self, now: u64, idle: u64) {
        self.patterns
            .retain(|_, pattern| now < pattern.last_used.saturating_add(idle));
    }
}

/// Translates a glob into anchored regex source: `*` matches any run, `?` a single character,
/// everything else is literal.
fn glob_regex_src(glob: &str) -> String {
    let mut src = String::with_capacity(glob.len() + 4);
    let mut literal = String::new();
    src.push('^');
    for c in glob.chars() {
        match c {
            '*' | '?' => {
                if !literal.is_empty() {
                    src.push_str(&regex::escape(&literal));
                    literal.clear();
                }
                src.push_str(if c == '*' { ".*" } else { "." });
            }
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        src.push_str(&regex::escape(&literal));
    }
    src.push('$');
    src
}

#[cfg(test)]
mod tests {
    use super::*;

    const CM: Casemapping = Casemapping::Rfc1459;

    fn presence_with(nick_hostmask: &str) -> PresenceCache {
        let mut presence = PresenceCache::new();
        presence.on_join(CM, "net1", "#chan", nick_hostmask);
        presence
    }

    #[test]
    fn test_glob_regex_src() {
        assert_eq!(glob_regex_src("*!*@h.example"), "^.*!.*@h\\.example$");
        assert_eq!(glob_regex_src("jo?"), "^jo.$");
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut cache = MaskCache::new();
        cache.add(CM, "net1", "#chan", 'b', "*!*@x", Some("op"), 1000, None);
        cache.add(CM, "net1", "#chan", 'b', "*!*@x", Some("op"), 1000, None);
        let list = cache.get(CM, "net1", "#chan", 'b').unwrap();
        assert_eq!(list.len(), 1);
        let entry = list.iter().next().unwrap();
        assert_eq!(entry.setter.as_deref(), Some("op"));
        assert_eq!(entry.set_at, 1000);
    }

    #[test]
    fn test_add_fills_only_empty_fields() {
        let mut cache = MaskCache::new();
        cache.add(CM, "net1", "#chan", 'b', "*!*@x", None, 0, None);
        cache.add(CM, "net1", "#chan", 'b', "*!*@X", Some("op"), 1000, Some("joe!u@x"));
        let list = cache.get(CM, "net1", "#chan", 'b').unwrap();
        assert_eq!(list.len(), 1);
        let entry = list.iter().next().unwrap();
        assert_eq!(entry.mask, "*!*@x");
        assert_eq!(entry.setter.as_deref(), Some("op"));
        assert_eq!(entry.set_at, 1000);

        // a populated field is not overwritten
        cache.add(CM, "net1", "#chan", 'b', "*!*@x", Some("other"), 2000, None);
        let entry = cache.get(CM, "net1", "#chan", 'b').unwrap().iter().next().unwrap().clone();
        assert_eq!(entry.setter.as_deref(), Some("op"));
        assert_eq!(entry.set_at, 1000);
    }

    #[test]
    fn test_remove() {
        let mut cache = MaskCache::new();
        cache.add(CM, "net1", "#chan", 'b', "*!*@x", None, 0, None);
        cache.remove(CM, "net1", "#chan", 'b', "*!*@X");
        assert!(cache.get(CM, "net1", "#chan", 'b').unwrap().is_empty());
        // no-op on absent mask
        cache.remove(CM, "net1", "#chan", 'b', "*!*@y");
    }

    #[test]
    fn test_search_by_nick() {
        let presence = presence_with("somenick!user@host.example");
        let mut cache = MaskCache::new();
        cache.add(
            CM, "net1", "#chan", 'b', "*!*@host.example", Some("opnick"), 1000, None,
        );

        let found = cache.search(CM, "net1", "#chan", 'b', "somenick", &presence, 2000);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mask, "*!*@host.example");

        let found = cache.search(CM, "net1", "#chan", 'b', "ghost", &presence, 2000);
        assert!(found.is_empty());
    }

    #[test]
    fn test_search_by_hostmask_and_pattern() {
        let presence = PresenceCache::new();
        let mut cache = MaskCache::new();
        cache.add(CM, "net1", "#chan", 'b', "*!*@host.example", None, 0, None);
        cache.add(CM, "net1", "#chan", 'b', "abuser!*@*", None, 0, None);

        let found = cache.search(
            CM, "net1", "#chan", 'b', "joe!u@host.example", &presence, 10,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mask, "*!*@host.example");

        let found = cache.search(CM, "net1", "#chan", 'b', "*abuser*", &presence, 10);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mask, "abuser!*@*");
    }

    #[test]
    fn test_search_folds_rfc1459() {
        let presence = PresenceCache::new();
        let mut cache = MaskCache::new();
        cache.add(CM, "net1", "#chan", 'b', "nick[a]!*@*", None, 0, None);
        let found = cache.search(CM, "net1", "#chan", 'b', "NICK{A}!u@h", &presence, 10);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_is_stale() {
        let mut cache = MaskCache::new();
        assert!(cache.is_stale(CM, "net1", "#chan", 'b', 60, 1000));
        cache.commit_synced(CM, "net1", "#chan", 'b', vec![], 1000);
        assert!(!cache.is_stale(CM, "net1", "#chan", 'b', 0, 1000));
        assert!(!cache.is_stale(CM, "net1", "#chan", 'b', 60, 1060));
        assert!(cache.is_stale(CM, "net1", "#chan", 'b', 60, 1061));
    }

    #[test]
    fn test_commit_replaces_membership() {
        let mut cache = MaskCache::new();
        cache.add(CM, "net1", "#chan", 'b', "*!*@gone", Some("op"), 1, None);
        cache.add(CM, "net1", "#chan", 'b', "*!*@kept", Some("op"), 2, Some("x!u@kept"));

        let staged = vec![
            MaskEntry {
                mask: "*!*@kept".to_owned(),
                setter: None,
                set_at: 2,
                affected: None,
            },
            MaskEntry::new("*!*@new"),
        ];
        cache.commit_synced(CM, "net1", "#chan", 'b', staged, 500);

        let list = cache.get(CM, "net1", "#chan", 'b').unwrap();
        let masks: Vec<&str> = list.iter().map(|e| e.mask.as_str()).collect();
        assert_eq!(masks, ["*!*@kept", "*!*@new"]);
        // local metadata survives the fetch
        let kept = list.iter().next().unwrap();
        assert_eq!(kept.setter.as_deref(), Some("op"));
        assert_eq!(kept.affected.as_deref(), Some("x!u@kept"));
        assert_eq!(list.last_synced_at(), Some(500));
    }

    #[test]
    fn test_ban_mask_for() {
        assert_eq!(ban_mask_for("joe!u@host.example"), "*!*@host.example");
        assert_eq!(ban_mask_for("joe"), "joe!*@*");
    }

    #[test]
    fn test_sweep_keeps_recent_patterns() {
        let presence = PresenceCache::new();
        let mut cache = MaskCache::new();
        cache.add(CM, "net1", "#chan", 'b', "*!*@x", None, 0, None);
        cache.search(CM, "net1", "#chan", 'b', "*x*", &presence, 100);
        cache.sweep(100 + 599, 600);
        assert_eq!(cache.matcher.patterns.len(), 1);
        cache.sweep(100 + 600, 600);
        assert!(cache.matcher.patterns.is_empty());
    }
}
