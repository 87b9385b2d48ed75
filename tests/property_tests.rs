use chrono::{Duration as ChronoDuration, Utc};
use proptest::prelude::*;
use std::time::Duration;
use usher::semaphore::peer_view::{evaluate, PeerView};
use usher::semaphore::PeerId;

const STALENESS: Duration = Duration::from_secs(15);

proptest! {
    #[test]
    fn test_admission_bounds_property(
        peers in prop::collection::vec(("[a-z]{3,8}", 0u16..1000, 0u16..30), 1..12),
        resources in 1u32..6
    ) {
        let now = Utc::now();
        let local = PeerId::from("local-peer");
        let mut view = PeerView::new().touch(&local, now, now);
        for (id, joined_secs_ago, seen_secs_ago) in &peers {
            view = view.touch(
                &PeerId::from(id.as_str()),
                now - ChronoDuration::seconds(*joined_secs_ago as i64),
                now - ChronoDuration::seconds(*seen_secs_ago as i64),
            );
        }

        let outcome = evaluate(&view, &local, now, resources, STALENESS);
        prop_assert!(outcome.active.len() <= resources as usize);
        prop_assert!(outcome.consumed <= resources);
        prop_assert!(outcome.consumed as usize <= outcome.peers);
        prop_assert_eq!(outcome.admitted, outcome.active.contains(&local));
    }

    #[test]
    fn test_admission_deterministic_property(
        peers in prop::collection::vec(("[a-z]{3,8}", 0u16..1000, 0u16..30), 1..12),
        resources in 1u32..6
    ) {
        let now = Utc::now();
        let local = PeerId::from("local-peer");
        let mut view = PeerView::new().touch(&local, now, now);
        for (id, joined_secs_ago, seen_secs_ago) in &peers {
            view = view.touch(
                &PeerId::from(id.as_str()),
                now - ChronoDuration::seconds(*joined_secs_ago as i64),
                now - ChronoDuration::seconds(*seen_secs_ago as i64),
            );
        }

        let first = evaluate(&view, &local, now, resources, STALENESS);
        let second = evaluate(&view, &local, now, resources, STALENESS);
        prop_assert_eq!(first.active, second.active);
        prop_assert_eq!(first.admitted, second.admitted);
        prop_assert_eq!(first.consumed, second.consumed);
    }

    #[test]
    fn test_no_waiter_outranks_a_holder_property(
        peers in prop::collection::vec(("[a-z]{3,8}", 0u16..1000), 1..12),
        resources in 1u32..6
    ) {
        let now = Utc::now();
        let local = PeerId::from("local-peer");
        // Everyone freshly seen, so ranking alone decides.
        let mut view = PeerView::new().touch(&local, now, now);
        for (id, joined_secs_ago) in &peers {
            view = view.touch(
                &PeerId::from(id.as_str()),
                now - ChronoDuration::seconds(*joined_secs_ago as i64),
                now,
            );
        }

        let outcome = evaluate(&view, &local, now, resources, STALENESS);
        prop_assert_eq!(outcome.active.len() as u32, outcome.consumed);
        for holder in &outcome.active {
            let held = outcome.view.get(holder).unwrap();
            for (waiter, waiting) in outcome.view.ranked() {
                if outcome.active.contains(waiter) {
                    continue;
                }
                prop_assert!((held.joined_at, holder) < (waiting.joined_at, waiter));
            }
        }
    }

    #[test]
    fn test_silent_peers_never_hold_slots_property(
        peers in prop::collection::vec(("[a-z]{3,8}", 0u16..1000, 16u16..1000), 1..12),
        resources in 1u32..6
    ) {
        let now = Utc::now();
        let local = PeerId::from("local-peer");
        let mut view = PeerView::new().touch(&local, now, now);
        for (id, joined_secs_ago, seen_secs_ago) in &peers {
            view = view.touch(
                &PeerId::from(id.as_str()),
                now - ChronoDuration::seconds(*joined_secs_ago as i64),
                now - ChronoDuration::seconds(*seen_secs_ago as i64),
            );
        }

        // Every generated peer is past the staleness window, so only the
        // local peer can be left standing.
        let outcome = evaluate(&view, &local, now, resources, STALENESS);
        prop_assert_eq!(outcome.peers, 1);
        prop_assert!(outcome.admitted);
        prop_assert_eq!(outcome.active, vec![local]);
    }

    #[test]
    fn test_local_peer_survives_any_silence_property(
        silent_secs in 16i64..100_000,
        resources in 1u32..6
    ) {
        let now = Utc::now();
        let local = PeerId::from("local-peer");
        let view = PeerView::new().touch(
            &local,
            now - ChronoDuration::seconds(silent_secs),
            now - ChronoDuration::seconds(silent_secs),
        );

        let outcome = evaluate(&view, &local, now, resources, STALENESS);
        prop_assert!(outcome.admitted);
        prop_assert_eq!(outcome.peers, 1);
    }
}
