use std::time::{Duration, Instant};

use murmur::dissemination::DisseminationComponent;
use murmur::gossip::handler::apply_event;
use murmur::membership::math::{ceil_log10, gossip_periods_to_spread, suspicion_timeout};
use murmur::membership::{GossipTerm, MemberId, MembershipEvent, MembershipEventType, MembershipList};
use murmur::settings::GossipSettings;
use proptest::prelude::*;

fn event_type() -> impl Strategy<Value = MembershipEventType> {
    prop_oneof![
        Just(MembershipEventType::Join),
        Just(MembershipEventType::Alive),
        Just(MembershipEventType::Suspect),
        Just(MembershipEventType::Confirm),
        Just(MembershipEventType::Leave),
    ]
}

fn setup() -> (MembershipList, DisseminationComponent) {
    let settings = GossipSettings::default();
    (
        MembershipList::new(MemberId::from("self"), GossipTerm::new(1, 0), &settings),
        DisseminationComponent::new(&settings),
    )
}

proptest! {
    #[test]
    fn test_suspicion_timeout_non_decreasing_property(
        multiplier in 1u32..10,
        size in 1usize..100_000,
        probe_ms in 1u64..5_000
    ) {
        let probe = Duration::from_millis(probe_ms);
        let smaller = suspicion_timeout(multiplier, size, probe);
        let larger = suspicion_timeout(multiplier, size + 1, probe);
        prop_assert!(larger >= smaller);
        prop_assert!(smaller >= probe * multiplier);
    }

    #[test]
    fn test_ceil_log10_bounds_property(value in 1u64..u64::MAX / 10) {
        let digits = ceil_log10(value);
        prop_assert!(10u128.pow(digits) >= value as u128);
        if digits > 0 {
            prop_assert!(10u128.pow(digits - 1) < value as u128);
        }
    }

    #[test]
    fn test_spread_periods_never_zero_property(multiplier in 1u32..10, size in 1usize..10_000) {
        prop_assert!(gossip_periods_to_spread(multiplier, size) >= multiplier);
    }

    #[test]
    fn test_term_never_decreases_property(
        facts in proptest::collection::vec((event_type(), 0u64..4, 0u64..20), 1..60)
    ) {
        let (mut membership, mut dissemination) = setup();
        let id = MemberId::from("peer");
        let now = Instant::now();
        let mut last_term: Option<GossipTerm> = None;

        for (event_type, epoch, heartbeat) in facts {
            let event = MembershipEvent::new(id.clone(), event_type, GossipTerm::new(epoch, heartbeat));
            let before = membership.get(&id).map(|m| (m.term(), m.status()));
            let applied = apply_event(&mut membership, &mut dissemination, &event, now);

            match (before, membership.get(&id)) {
                (Some((term, _)), Some(member)) => {
                    prop_assert!(member.term() >= term);
                    last_term = Some(member.term());
                }
                (Some((term, _)), None) => {
                    // removal needs a term at least as new
                    prop_assert!(applied);
                    prop_assert!(event.term >= term);
                }
                (None, Some(member)) => last_term = Some(member.term()),
                (None, None) => {}
            }
            if event.term < last_term.unwrap_or_default() && before.is_some() {
                prop_assert!(!applied);
            }
        }
    }

    #[test]
    fn test_repeated_fact_is_idempotent_property(
        event_type in event_type(),
        epoch in 0u64..4,
        heartbeat in 0u64..20
    ) {
        let (mut membership, mut dissemination) = setup();
        let now = Instant::now();
        let seed = MembershipEvent::new(MemberId::from("peer"), MembershipEventType::Alive, GossipTerm::new(1, 5));
        apply_event(&mut membership, &mut dissemination, &seed, now);

        let event = MembershipEvent::new(MemberId::from("peer"), event_type, GossipTerm::new(epoch, heartbeat));
        apply_event(&mut membership, &mut dissemination, &event, now);
        let once = membership.snapshot();

        let applied_again = apply_event(&mut membership, &mut dissemination, &event, now);
        prop_assert!(!applied_again);
        prop_assert_eq!(membership.snapshot(), once);
    }
}
