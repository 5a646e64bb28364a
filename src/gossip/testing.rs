//! In-memory sender for driving the protocol in unit tests
use std::time::Instant;

use super::request::{GossipEventSender, RequestHandle, ResponseSlot, ResponseTracker};
use crate::membership::MemberId;
use crate::protocol::{GossipRequest, GossipResponse};

#[derive(Debug)]
pub(crate) struct SentRequest {
    pub to: MemberId,
    pub request: GossipRequest,
    pub deadline: Instant,
    pub slot: Option<ResponseSlot>,
}

/// Records every send; tests complete or fail the recorded slots by hand
#[derive(Debug, Default)]
pub(crate) struct RecordingSender {
    tracker: ResponseTracker,
    pub requests: Vec<SentRequest>,
    pub responses: Vec<(MemberId, u64, GossipResponse)>,
}

impl RecordingSender {
    fn open_slot(&mut self, to: &str) -> Option<ResponseSlot> {
        self.requests
            .iter_mut()
            .rev()
            .filter(|r| r.to.as_str() == to)
            .find_map(|r| r.slot.take())
    }

    /// Complete the latest open request sent to `to`
    pub fn complete(&mut self, to: &str, response: GossipResponse) -> bool {
        match self.open_slot(to) {
            Some(slot) => {
                slot.complete(response);
                true
            }
            None => false,
        }
    }

    /// Fail the latest open request sent to `to`
    pub fn fail(&mut self, to: &str, reason: &str) -> bool {
        match self.open_slot(to) {
            Some(slot) => {
                slot.fail(reason);
                true
            }
            None => false,
        }
    }

    pub fn requests_to(&self, to: &str) -> Vec<&GossipRequest> {
        self.requests
            .iter()
            .filter(|r| r.to.as_str() == to)
            .map(|r| &r.request)
            .collect()
    }

    pub fn last_request(&self) -> Option<&SentRequest> {
        self.requests.last()
    }

    pub fn clear(&mut self) {
        self.requests.clear();
        self.responses.clear();
    }
}

impl GossipEventSender for RecordingSender {
    fn send_request(
        &mut self,
        to: &MemberId,
        request: GossipRequest,
        deadline: Instant,
    ) -> RequestHandle {
        let (handle, slot) = self.tracker.register(to.clone(), deadline);
        self.requests.push(SentRequest {
            to: to.clone(),
            request,
            deadline,
            slot: Some(slot),
        });
        handle
    }

    fn send_response(&mut self, to: &MemberId, request_id: u64, response: GossipResponse) {
        self.responses.push((to.clone(), request_id, response));
    }
}
