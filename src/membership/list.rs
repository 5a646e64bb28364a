use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::math::suspicion_timeout;
use super::{GossipTerm, Member, MemberId, MemberRecord, MembershipStatus};
use crate::error::Result;
use crate::settings::GossipSettings;

/// Observer of membership changes, e.g. cluster-aware routing.
///
/// Callbacks run synchronously, in registration order, before the mutating
/// call returns. A failing listener is logged and skipped; it never blocks
/// delivery to the others.
pub trait MembershipListener: Send {
    fn on_add(&mut self, member: &Member) -> Result<()>;
    fn on_remove(&mut self, member: &Member) -> Result<()>;
}

// Removed ids remembered so late facts cannot bring them back
const MAX_TOMBSTONES: usize = 1024;
// Removals a cursor can catch up with before it restarts its lap
const REMOVAL_LOG_SIZE: usize = 64;

enum Change {
    Added,
    Removed,
}

/// The authoritative local view of the cluster.
///
/// Holds every known peer except the local node itself. There is a single
/// writer (the node's gossip loop), so no internal locking.
pub struct MembershipList {
    self_member: Member,
    members: Vec<Member>,
    listeners: Vec<Box<dyn MembershipListener>>,
    tombstones: VecDeque<(MemberId, GossipTerm)>,
    removal_seq: u64,
    removals: VecDeque<(u64, usize)>,
    suspicion_multiplier: u32,
    probe_interval: Duration,
}

impl std::fmt::Debug for MembershipList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipList")
            .field("self", &self.self_member)
            .field("members", &self.members)
            .field("listeners", &self.listeners.len())
            .field("tombstones", &self.tombstones.len())
            .finish()
    }
}

impl MembershipList {
    pub fn new(self_id: MemberId, term: GossipTerm, settings: &GossipSettings) -> Self {
        Self {
            self_member: Member::new(self_id, term),
            members: Vec::new(),
            listeners: Vec::new(),
            tombstones: VecDeque::new(),
            removal_seq: 0,
            removals: VecDeque::new(),
            suspicion_multiplier: settings.suspicion_multiplier,
            probe_interval: settings.probe_interval,
        }
    }

    pub fn self_member(&self) -> &Member {
        &self.self_member
    }

    pub fn self_id(&self) -> &MemberId {
        self.self_member.id()
    }

    pub fn is_self(&self, id: &MemberId) -> bool {
        self.self_member.id() == id
    }

    /// Publish a new fact about ourselves: bump our heartbeat
    pub fn bump_self_term(&mut self) -> GossipTerm {
        let mut term = self.self_member.term();
        let term = term.increment();
        self.self_member.set_term(term);
        term
    }

    /// Outbid a rumour about ourselves carrying `observed`
    pub fn refute(&mut self, observed: GossipTerm) -> GossipTerm {
        let mut term = self.self_member.term().max(observed);
        let term = term.increment();
        self.self_member.set_term(term);
        term
    }

    pub fn has_member(&self, id: &MemberId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &MemberId) -> Option<&Member> {
        self.members.iter().find(|m| m.id() == id)
    }

    fn position(&self, id: &MemberId) -> Option<usize> {
        self.members.iter().position(|m| m.id() == id)
    }

    /// Number of peers, self excluded
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of cluster members as seen locally, self included
    pub fn cluster_size(&self) -> usize {
        self.members.len() + 1
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Member> {
        self.members.iter()
    }

    /// A restartable cursor that tolerates removal of the current element
    pub fn cursor(&self) -> MembershipCursor {
        MembershipCursor::default()
    }

    /// Records for every member including self, self first
    pub fn snapshot(&self) -> Vec<MemberRecord> {
        std::iter::once(&self.self_member)
            .chain(self.members.iter())
            .map(Member::record)
            .collect()
    }

    /// Term a removed member was last known with
    pub fn tombstone(&self, id: &MemberId) -> Option<GossipTerm> {
        self.tombstones
            .iter()
            .find(|(buried, _)| buried == id)
            .map(|(_, term)| *term)
    }

    /// Remember that `id` is gone as of `term`. Facts about it up to that
    /// term no longer add it back.
    pub fn bury(&mut self, id: MemberId, term: GossipTerm) {
        if let Some(entry) = self.tombstones.iter_mut().find(|(buried, _)| *buried == id) {
            entry.1 = entry.1.max(term);
            return;
        }
        if self.tombstones.len() >= MAX_TOMBSTONES {
            self.tombstones.pop_front();
        }
        self.tombstones.push_back((id, term));
    }

    pub fn add_listener(&mut self, listener: Box<dyn MembershipListener>) {
        self.listeners.push(listener);
    }

    /// Suspicion timeout for the current cluster size
    pub fn suspicion_timeout(&self) -> Duration {
        suspicion_timeout(
            self.suspicion_multiplier,
            self.cluster_size(),
            self.probe_interval,
        )
    }

    /// Insert a new alive member and notify listeners.
    ///
    /// Callers check [`MembershipList::has_member`] first; inserting a known
    /// id (or self) leaves the list untouched and returns the stored record.
    pub fn new_member(&mut self, id: MemberId, term: GossipTerm) -> &Member {
        if self.is_self(&id) {
            debug!("[{}] Ignoring attempt to add self as member", id);
            return &self.self_member;
        }
        if let Some(pos) = self.position(&id) {
            warn!(
                "[{}] Member {} already present, not adding it twice",
                self.self_id(),
                id
            );
            return &self.members[pos];
        }

        debug!("[{}] New member {} with term {}", self.self_id(), id, term);
        self.tombstones.retain(|(buried, _)| *buried != id);
        self.members.push(Member::new(id, term));
        let idx = self.members.len() - 1;
        notify(&mut self.listeners, &self.members[idx], Change::Added);
        &self.members[idx]
    }

    /// Remove a member and notify listeners; no-op for unknown ids
    pub fn remove_member(&mut self, id: &MemberId) -> Option<Member> {
        let pos = self.position(id)?;
        let member = self.members.remove(pos);
        debug!("[{}] Removed member {}", self.self_id(), id);
        self.removal_seq += 1;
        if self.removals.len() >= REMOVAL_LOG_SIZE {
            self.removals.pop_front();
        }
        self.removals.push_back((self.removal_seq, pos));
        self.bury(member.id().clone(), member.term());
        notify(&mut self.listeners, &member, Change::Removed);
        Some(member)
    }

    /// Mark a member alive, clearing any suspicion.
    ///
    /// Returns false for unknown ids and for stale terms.
    pub fn alive_member(&mut self, id: &MemberId, term: GossipTerm) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        let member = &mut self.members[pos];
        if !term.supersedes_or_equals(&member.term()) {
            return false;
        }
        if member.status() != MembershipStatus::Alive {
            debug!("[{}] Member {} is alive again", self.self_member.id(), id);
        }
        member.set_alive(term);
        true
    }

    /// Mark a member suspect with a deadline of `now + suspicion timeout`.
    ///
    /// Returns false for unknown ids and for stale terms.
    pub fn suspect_member(&mut self, id: &MemberId, term: GossipTerm, now: Instant) -> bool {
        let timeout = self.suspicion_timeout();
        let Some(pos) = self.position(id) else {
            return false;
        };
        let member = &mut self.members[pos];
        if !term.supersedes_or_equals(&member.term()) {
            return false;
        }
        debug!(
            "[{}] Suspecting member {} for {}ms",
            self.self_member.id(),
            id,
            timeout.as_millis()
        );
        member.set_suspect(term, now + timeout);
        true
    }
}

fn notify(listeners: &mut [Box<dyn MembershipListener>], member: &Member, change: Change) {
    for listener in listeners.iter_mut() {
        let result = match change {
            Change::Added => listener.on_add(member),
            Change::Removed => listener.on_remove(member),
        };
        if let Err(e) = result {
            warn!("Membership listener failed for {}: {}", member.id(), e);
        }
    }
}

/// Index cursor over a [`MembershipList`].
///
/// The cursor borrows the list only per call, so the list can be mutated
/// between steps. [`MembershipCursor::remove`] deletes the element returned
/// last and rewinds, so the remaining elements are neither skipped nor
/// repeated. Removals made through the list itself are caught up with on
/// the next step.
#[derive(Clone, Debug, Default)]
pub struct MembershipCursor {
    index: usize,
    // removal sequence the index is aligned with
    seen: Option<u64>,
}

impl MembershipCursor {
    pub fn has_next(&mut self, list: &MembershipList) -> bool {
        self.sync(list);
        self.index < list.members.len()
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next<'a>(&mut self, list: &'a MembershipList) -> Option<&'a Member> {
        self.sync(list);
        let member = list.members.get(self.index)?;
        self.index += 1;
        Some(member)
    }

    /// Remove the member returned by the last call to `next`
    pub fn remove(&mut self, list: &mut MembershipList) -> Option<Member> {
        self.sync(list);
        if self.index == 0 {
            return None;
        }
        let id = list.members.get(self.index - 1)?.id().clone();
        self.index -= 1;
        let removed = list.remove_member(&id);
        self.seen = Some(list.removal_seq);
        removed
    }

    pub fn reset(&mut self) {
        self.index = 0;
        self.seen = None;
    }

    fn sync(&mut self, list: &MembershipList) {
        let Some(seen) = self.seen else {
            self.seen = Some(list.removal_seq);
            return;
        };
        if seen == list.removal_seq {
            return;
        }
        let covered = matches!(list.removals.front(), Some((first, _)) if *first <= seen + 1);
        if covered {
            for (_, pos) in list.removals.iter().filter(|(seq, _)| *seq > seen) {
                if *pos < self.index {
                    self.index -= 1;
                }
            }
        } else {
            self.index = 0;
        }
        self.seen = Some(list.removal_seq);
    }
}
