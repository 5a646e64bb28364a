//! Applies membership facts received from peers.
//!
//! Every transition is gated on the fact's term: a fact older than what is
//! stored for the member is dropped. Applied facts are queued again so they
//! keep spreading. Rumours that we are suspect or dead are refuted by
//! publishing an ALIVE fact with a higher term.
use std::time::Instant;

use tracing::{debug, info, trace};

use crate::dissemination::DisseminationComponent;
use crate::membership::{
    MemberRecord, MembershipEvent, MembershipEventType, MembershipList, MembershipStatus,
};

/// Apply one fact; returns true if the local view changed
pub fn apply_event(
    membership: &mut MembershipList,
    dissemination: &mut DisseminationComponent,
    event: &MembershipEvent,
    now: Instant,
) -> bool {
    if membership.is_self(&event.member_id) {
        return apply_self_event(membership, dissemination, event);
    }

    let id = &event.member_id;
    let applied = match (event.event_type, membership.get(id)) {
        (MembershipEventType::Join | MembershipEventType::Alive, None) => {
            if is_buried(membership, event) {
                trace!("[{}] {} was removed, ignoring {}", membership.self_id(), id, event);
                return false;
            }
            info!(
                "[{}] Member {} joined with term {}",
                membership.self_id(),
                id,
                event.term
            );
            membership.new_member(id.clone(), event.term);
            true
        }
        (MembershipEventType::Join | MembershipEventType::Alive, Some(member)) => {
            let newer = event.term > member.term();
            let revives = event.term == member.term() && member.status() != MembershipStatus::Alive;
            (newer || revives) && membership.alive_member(id, event.term)
        }
        (MembershipEventType::Suspect, Some(member)) => {
            let newer = event.term > member.term();
            let fresh = event.term == member.term() && member.status() == MembershipStatus::Alive;
            (newer || fresh) && membership.suspect_member(id, event.term, now)
        }
        (MembershipEventType::Suspect, None) => false,
        (MembershipEventType::Confirm | MembershipEventType::Leave, Some(member)) => {
            if event.term.supersedes_or_equals(&member.term()) {
                info!(
                    "[{}] Member {} removed after {}",
                    membership.self_id(),
                    id,
                    event.event_type
                );
                membership.remove_member(id).is_some()
            } else {
                false
            }
        }
        (MembershipEventType::Confirm | MembershipEventType::Leave, None) => {
            membership.bury(id.clone(), event.term);
            false
        }
    };

    if applied {
        dissemination.add_membership_event(id.clone(), event.event_type, event.term);
    } else {
        trace!("[{}] Discarding stale or redundant {}", membership.self_id(), event);
    }
    applied
}

// a removed member only comes back with a strictly newer term
fn is_buried(membership: &MembershipList, event: &MembershipEvent) -> bool {
    matches!(membership.tombstone(&event.member_id), Some(term) if event.term <= term)
}

fn apply_self_event(
    membership: &mut MembershipList,
    dissemination: &mut DisseminationComponent,
    event: &MembershipEvent,
) -> bool {
    match event.event_type {
        MembershipEventType::Suspect | MembershipEventType::Confirm
            if event.term.supersedes_or_equals(&membership.self_member().term()) =>
        {
            let term = membership.refute(event.term);
            debug!(
                "[{}] Refuting {} about self with term {}",
                membership.self_id(),
                event.event_type,
                term
            );
            dissemination.add_membership_event(
                membership.self_id().clone(),
                MembershipEventType::Alive,
                term,
            );
            true
        }
        _ => false,
    }
}

/// Apply a batch of piggybacked facts; returns how many changed the view
pub fn apply_events(
    membership: &mut MembershipList,
    dissemination: &mut DisseminationComponent,
    events: &[MembershipEvent],
    now: Instant,
) -> usize {
    events
        .iter()
        .filter(|event| apply_event(membership, dissemination, event, now))
        .count()
}

/// Merge a full membership snapshot received through SYNC
pub fn apply_snapshot(
    membership: &mut MembershipList,
    dissemination: &mut DisseminationComponent,
    records: &[MemberRecord],
    now: Instant,
) -> usize {
    let mut applied = 0;
    for record in records {
        let event_type = match record.status {
            MembershipStatus::Alive => MembershipEventType::Alive,
            MembershipStatus::Suspect => MembershipEventType::Suspect,
            MembershipStatus::Dead => MembershipEventType::Confirm,
        };
        // a suspect we never heard of is still a member
        let event = MembershipEvent::new(record.id.clone(), event_type, record.term);
        if event_type == MembershipEventType::Suspect
            && !membership.is_self(&record.id)
            && !membership.has_member(&record.id)
            && !is_buried(membership, &event)
        {
            membership.new_member(record.id.clone(), record.term);
        }
        if apply_event(membership, dissemination, &event, now) {
            applied += 1;
        }
    }
    applied
}
