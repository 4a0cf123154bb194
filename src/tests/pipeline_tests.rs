//! One-direction pipeline tests over socketpair-backed endpoints.
//!
//! Release times are driven with synthetic `flush_due` clocks, so these
//! tests check exact scheduling math without sleeping.

use crate::link::{Bandwidth, LinkConfig};
use crate::test_helpers::{TestLink, test_frame};

fn link_with(bandwidth: Bandwidth, delay_ms: i64, loss: u32) -> TestLink {
    let config = LinkConfig::new();
    config.apply(bandwidth, delay_ms, loss);
    TestLink::new(config)
}

/// Release the queue head at exactly its departure time, returning
/// `(arrival, departure)`. Panics if nothing was due.
fn release_head(link: &mut TestLink) -> (i64, i64) {
    let head = link.endpoint.queue().peek_head().expect("queued frame");
    let (arrival, departure) = (head.arrival_us, head.departure_us);
    assert_eq!(link.endpoint.flush_due(departure - 1), 0, "released early");
    assert_eq!(link.endpoint.flush_due(departure), 1);
    (arrival, departure)
}

#[test]
fn test_pure_delay() {
    let mut link = link_with(Bandwidth::Unlimited, 100, 0);
    let payload = test_frame(1000);
    link.inject_frame(&payload);

    assert_eq!(link.endpoint.poll_once(), 1);
    let (arrival, departure) = release_head(&mut link);
    assert_eq!(departure - arrival, 100_000);

    let received = link.try_receive().expect("forwarded frame");
    assert_eq!(received, payload);
    assert!(link.try_receive().is_none());
}

#[test]
fn test_pure_bandwidth_serialization_gaps() {
    // 1000 bytes at 8 Mbps: 1000 µs on the wire per frame.
    let mut link = link_with(Bandwidth::Limited(8_000_000), 0, 0);
    for _ in 0..10 {
        link.inject_frame(&test_frame(1000));
    }
    assert_eq!(link.endpoint.poll_once(), 10);

    let mut finish = 0i64;
    for _ in 0..10 {
        let (arrival, departure) = release_head(&mut link);
        // A frame starts when both the wire is free and it has arrived.
        finish = finish.max(arrival) + 1000;
        assert_eq!(departure, finish);
        assert!(link.try_receive().is_some());
    }
    assert!(link.endpoint.queue().is_empty());
}

#[test]
fn test_bandwidth_and_delay_compose() {
    let mut link = link_with(Bandwidth::Limited(8_000_000), 50, 0);
    for _ in 0..3 {
        link.inject_frame(&test_frame(1000));
    }
    assert_eq!(link.endpoint.poll_once(), 3);

    let mut finish = 0i64;
    for _ in 0..3 {
        let (arrival, departure) = release_head(&mut link);
        finish = finish.max(arrival) + 1000;
        // Queueing delay and propagation delay compose additively.
        assert_eq!(departure, finish + 50_000);
    }
}

#[test]
fn test_departures_monotonic_across_parameter_changes() {
    let link_config = LinkConfig::new();
    link_config.apply(Bandwidth::Limited(8_000_000), 20, 0);
    let mut link = TestLink::new(link_config.clone());

    link.inject_frame(&test_frame(1000));
    link.inject_frame(&test_frame(1000));
    assert_eq!(link.endpoint.poll_once(), 2);

    // Tighten the link mid-stream; already-queued frames keep their times.
    link_config.apply(Bandwidth::Limited(1_000_000), 200, 0);
    link.inject_frame(&test_frame(1000));
    assert_eq!(link.endpoint.poll_once(), 1);

    let mut last = i64::MIN;
    for _ in 0..3 {
        let head = link.endpoint.queue().peek_head().unwrap().departure_us;
        assert!(head >= last, "departure went backwards");
        last = head;
        assert_eq!(link.endpoint.flush_due(head), 1);
    }
}

#[test]
fn test_overflow_tail_drops() {
    // Slow enough that nothing is due while the test runs.
    let config = LinkConfig::new();
    config.apply(Bandwidth::Limited(1_000), 0, 0);
    let mut link = TestLink::with_queue_capacity(config, 4);

    for _ in 0..10 {
        link.inject_frame(&test_frame(1000));
    }
    link.endpoint.poll_once();

    assert_eq!(link.endpoint.queue().len(), 4);
    assert_eq!(link.endpoint.stats().snapshot().tail_drops, 6);

    // The four admitted frames eventually all come out.
    assert_eq!(link.endpoint.flush_due(i64::MAX), 4);
    assert_eq!(link.drain_received().len(), 4);
}

#[test]
fn test_loss_rate_over_many_frames() {
    let mut link = link_with(Bandwidth::Unlimited, 0, 5_000);
    let total = 10_000;
    let mut forwarded = 0;
    for _ in 0..total {
        link.inject_frame(&test_frame(200));
        assert_eq!(link.endpoint.poll_once(), 1);
        assert_eq!(link.endpoint.flush_due(i64::MAX), 1);
        if link.try_receive().is_some() {
            forwarded += 1;
        }
    }

    let stats = link.endpoint.stats().snapshot();
    assert_eq!(stats.loss_drops + forwarded, total);
    // p = 0.5 over 10k draws: σ = 50; allow 6σ for the fixed seed.
    assert!(
        (4_700..=5_300).contains(&forwarded),
        "forwarded {forwarded} outside expected band"
    );
}

#[test]
fn test_no_reordering_within_direction() {
    let mut link = link_with(Bandwidth::Limited(8_000_000), 10, 0);
    for i in 0..50u8 {
        let mut payload = test_frame(100);
        payload[14] = i;
        link.inject_frame(&payload);
    }
    assert_eq!(link.endpoint.poll_once(), 50);
    assert_eq!(link.endpoint.flush_due(i64::MAX), 50);

    let received = link.drain_received();
    assert_eq!(received.len(), 50);
    for (i, frame) in received.iter().enumerate() {
        assert_eq!(frame[14], i as u8, "frame {i} out of order");
    }
}

#[test]
fn test_queue_length_never_exceeds_cap() {
    let config = LinkConfig::new();
    config.apply(Bandwidth::Limited(1_000), 0, 0);
    let mut link = TestLink::with_queue_capacity(config, 8);

    for round in 0..20 {
        for _ in 0..4 {
            link.inject_frame(&test_frame(64));
        }
        link.endpoint.poll_once();
        assert!(
            link.endpoint.queue().len() <= 8,
            "round {round}: queue over capacity"
        );
    }
}
