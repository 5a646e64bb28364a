//! Piggyback dissemination.
//!
//! Membership facts are not broadcast on their own. They wait in a bounded
//! buffer and ride along on the PING, ACK and SYNC messages the protocol
//! sends anyway. Each fact is attached to
//! `retransmission_multiplier * ceil(log10(n + 1))` messages, enough for an
//! infection-style spread to reach the cluster with high probability, and is
//! then forgotten.
use std::collections::VecDeque;

use tracing::trace;

use crate::membership::math::gossip_periods_to_spread;
use crate::membership::{GossipTerm, MemberId, MembershipEvent, MembershipEventType};
use crate::settings::GossipSettings;

#[derive(Clone, Debug)]
struct BufferedEvent {
    event: MembershipEvent,
    spread_count: u32,
}

#[derive(Clone, Debug)]
pub struct DisseminationComponent {
    buffer: VecDeque<BufferedEvent>,
    capacity: usize,
    max_events_per_message: usize,
    retransmission_multiplier: u32,
    dropped: u64,
}

impl DisseminationComponent {
    pub fn new(settings: &GossipSettings) -> Self {
        Self {
            buffer: VecDeque::with_capacity(settings.dissemination_buffer_capacity),
            capacity: settings.dissemination_buffer_capacity,
            max_events_per_message: settings.max_membership_events_per_message,
            retransmission_multiplier: settings.retransmission_multiplier,
            dropped: 0,
        }
    }

    /// Queue a fact for dissemination.
    ///
    /// Never fails: a queued fact about the same member is replaced by a
    /// newer one, and when the buffer is full the oldest fact is dropped.
    pub fn add_membership_event(
        &mut self,
        member_id: MemberId,
        event_type: MembershipEventType,
        term: GossipTerm,
    ) {
        let event = MembershipEvent::new(member_id, event_type, term);

        if let Some(existing) = self
            .buffer
            .iter_mut()
            .find(|b| b.event.member_id == event.member_id)
        {
            if event.term >= existing.event.term {
                existing.event = event;
                existing.spread_count = 0;
            }
            return;
        }

        if self.buffer.len() >= self.capacity {
            if let Some(oldest) = self.buffer.pop_front() {
                self.dropped += 1;
                trace!("Dissemination buffer full, dropping {}", oldest.event);
            }
        }
        self.buffer.push_back(BufferedEvent {
            event,
            spread_count: 0,
        });
    }

    /// Take the facts to attach to one outgoing message.
    ///
    /// Facts are handed out oldest first; a fact that has now been sent
    /// often enough for a cluster of `cluster_size` leaves the buffer.
    pub fn events_for_message(&mut self, cluster_size: usize) -> Vec<MembershipEvent> {
        let spread_limit = gossip_periods_to_spread(self.retransmission_multiplier, cluster_size);

        let events: Vec<MembershipEvent> = self
            .buffer
            .iter_mut()
            .take(self.max_events_per_message)
            .map(|buffered| {
                buffered.spread_count += 1;
                buffered.event.clone()
            })
            .collect();

        self.buffer.retain(|b| b.spread_count < spread_limit);
        events
    }

    pub fn iter(&self) -> impl Iterator<Item = &MembershipEvent> {
        self.buffer.iter().map(|b| &b.event)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Facts lost to buffer pressure since startup
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
