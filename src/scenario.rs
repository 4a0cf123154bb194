//! Scripted impairment: a timeline of parameter changes replayed against
//! the wall clock.
//!
//! Events wait in a min-priority queue ordered by start time. At most one
//! event is active; an event activating while another is active supersedes
//! it. When the total duration elapses, both directions are forced into
//! the link-down profile and the driver terminates.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use smallvec::SmallVec;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, info};

use crate::link::{Bandwidth, LinkConfig};
use crate::utils::now_ms;

/// Driver tick period. Event boundaries are honored to this granularity.
pub const TICK_MS: u64 = 10;

/// One impairment episode.
#[derive(Clone, Debug)]
pub struct NetworkEvent {
    pub start_ms: i64,
    pub duration_ms: i64,
    pub bandwidth: Bandwidth,
    pub delay_ms: i64,
    pub loss_per_10000: u32,
    pub description: String,
}

impl NetworkEvent {
    fn end_ms(&self) -> i64 {
        self.start_ms + self.duration_ms
    }
}

/// Heap key: order events by start time only.
struct ByStart(NetworkEvent);

impl PartialEq for ByStart {
    fn eq(&self, other: &Self) -> bool {
        self.0.start_ms == other.0.start_ms
    }
}

impl Eq for ByStart {}

impl PartialOrd for ByStart {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByStart {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.start_ms.cmp(&other.0.start_ms)
    }
}

/// Cancellation and pause handles, shared with whoever supervises the run.
#[derive(Clone, Default)]
pub struct ScenarioControls {
    stop: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl ScenarioControls {
    /// Request termination; the driver returns within one tick.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Freeze the timeline state machine. Elapsed time keeps running, so
    /// events whose window passes entirely while paused are handled by the
    /// ordinary head-vs-elapsed comparison on resume.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}

pub struct ScenarioDriver {
    a_to_b: LinkConfig,
    b_to_a: LinkConfig,
    total_ms: i64,
    timeline: BinaryHeap<Reverse<ByStart>>,
    current: Option<NetworkEvent>,
    controls: ScenarioControls,
}

impl ScenarioDriver {
    pub fn new(a_to_b: LinkConfig, b_to_a: LinkConfig, total_ms: i64) -> Self {
        Self {
            a_to_b,
            b_to_a,
            total_ms,
            timeline: BinaryHeap::new(),
            current: None,
            controls: ScenarioControls::default(),
        }
    }

    pub fn controls(&self) -> ScenarioControls {
        self.controls.clone()
    }

    pub fn add_event(&mut self, event: NetworkEvent) {
        debug!(
            "scheduled event at {}ms for {}ms: {}",
            event.start_ms, event.duration_ms, event.description
        );
        self.timeline.push(Reverse(ByStart(event)));
    }

    pub fn load(&mut self, events: impl IntoIterator<Item = NetworkEvent>) {
        for event in events {
            self.add_event(event);
        }
    }

    pub fn pending_events(&self) -> usize {
        self.timeline.len()
    }

    /// Advance the state machine to `elapsed_ms`. Returns `true` once the
    /// scenario has finalized.
    ///
    /// Order matters: expiry of the current event is checked before
    /// activation, so an event starting exactly when its predecessor ends
    /// sees the defaults applied and then overwritten in the same tick.
    pub fn tick(&mut self, elapsed_ms: i64) -> bool {
        if let Some(current) = &self.current
            && elapsed_ms >= current.end_ms()
        {
            info!("event ended: {}", current.description);
            self.a_to_b.reset_defaults();
            self.b_to_a.reset_defaults();
            self.current = None;
        }

        let head_due = self
            .timeline
            .peek()
            .is_some_and(|Reverse(ByStart(head))| elapsed_ms >= head.start_ms);
        if head_due {
            let Some(Reverse(ByStart(event))) = self.timeline.pop() else {
                unreachable!("peeked head");
            };
            if let Some(superseded) = &self.current {
                info!("event superseded: {}", superseded.description);
            }
            info!(
                "event active: {} (bandwidth {}, delay {}ms, loss {}/10000)",
                event.description, event.bandwidth, event.delay_ms, event.loss_per_10000
            );
            self.a_to_b
                .apply(event.bandwidth, event.delay_ms, event.loss_per_10000);
            self.b_to_a
                .apply(event.bandwidth, event.delay_ms, event.loss_per_10000);
            self.current = Some(event);
        }

        if elapsed_ms >= self.total_ms {
            info!("scenario complete after {elapsed_ms}ms, taking link down");
            self.a_to_b.set_link_down();
            self.b_to_a.set_link_down();
            return true;
        }
        false
    }

    /// Replay the timeline against the wall clock until finalization or
    /// [`ScenarioControls::stop`].
    pub async fn run(mut self) {
        let t0 = now_ms();
        let mut timer = time::interval(Duration::from_millis(TICK_MS));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "scenario started: {} events over {}ms",
            self.timeline.len(),
            self.total_ms
        );
        loop {
            timer.tick().await;
            if self.controls.stop.load(Ordering::Relaxed) {
                info!("scenario stopped");
                return;
            }
            if self.controls.paused.load(Ordering::Relaxed) {
                continue;
            }
            if self.tick(now_ms() - t0) {
                return;
            }
        }
    }
}

/// Total duration of the built-in demo scenario.
pub const DEMO_TOTAL_MS: i64 = 40_000;

/// The built-in 40-second demo: normal, congested, oscillating, recovered.
pub fn demo_events() -> SmallVec<[NetworkEvent; 16]> {
    let mut events: SmallVec<[NetworkEvent; 16]> = SmallVec::new();

    events.push(NetworkEvent {
        start_ms: 0,
        duration_ms: 10_000,
        bandwidth: Bandwidth::Limited(100_000_000),
        delay_ms: 20,
        loss_per_10000: 0,
        description: "normal: 100Mbps, 20ms".into(),
    });
    events.push(NetworkEvent {
        start_ms: 10_000,
        duration_ms: 10_000,
        bandwidth: Bandwidth::Limited(10_000_000),
        delay_ms: 200,
        loss_per_10000: 500,
        description: "congested: 10Mbps, 200ms, 5% loss".into(),
    });
    for i in 0..5 {
        let burst = i % 2 == 1;
        events.push(NetworkEvent {
            start_ms: 20_000 + i * 2_000,
            duration_ms: 2_000,
            bandwidth: if burst {
                Bandwidth::Limited(5_000_000)
            } else {
                Bandwidth::Limited(80_000_000)
            },
            delay_ms: if burst { 300 } else { 15 },
            loss_per_10000: if burst { 800 } else { 10 },
            description: if burst {
                format!("oscillating {}: burst", i + 1)
            } else {
                format!("oscillating {}: clear", i + 1)
            },
        });
    }
    events.push(NetworkEvent {
        start_ms: 30_000,
        duration_ms: 10_000,
        bandwidth: Bandwidth::Limited(100_000_000),
        delay_ms: 20,
        loss_per_10000: 0,
        description: "recovered: 100Mbps, 20ms".into(),
    });

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LINK_DOWN_DELAY_MS, LINK_DOWN_LOSS};

    fn event(start_ms: i64, duration_ms: i64, desc: &str) -> NetworkEvent {
        NetworkEvent {
            start_ms,
            duration_ms,
            bandwidth: Bandwidth::Limited(1_000_000),
            delay_ms: 10,
            loss_per_10000: 0,
            description: desc.into(),
        }
    }

    #[test]
    fn test_events_activate_in_start_order() {
        let a = LinkConfig::new();
        let b = LinkConfig::new();
        let mut driver = ScenarioDriver::new(a, b, 100_000);
        // Inserted out of order.
        driver.add_event(event(2_000, 500, "late"));
        driver.add_event(event(0, 500, "early"));

        driver.tick(0);
        assert_eq!(driver.current.as_ref().unwrap().description, "early");
        driver.tick(2_000);
        assert_eq!(driver.current.as_ref().unwrap().description, "late");
    }

    #[test]
    fn test_expiry_restores_defaults() {
        let a = LinkConfig::new();
        let b = LinkConfig::new();
        let mut driver = ScenarioDriver::new(a.clone(), b.clone(), 100_000);
        driver.add_event(event(0, 1_000, "only"));

        driver.tick(0);
        assert_eq!(a.snapshot().delay_ms, 10);
        assert_eq!(b.snapshot().delay_ms, 10);

        driver.tick(1_000);
        assert!(driver.current.is_none());
        assert_eq!(a.snapshot().bandwidth, Bandwidth::Unlimited);
        assert_eq!(a.snapshot().delay_ms, 0);
        assert_eq!(b.snapshot().delay_ms, 0);
    }

    #[test]
    fn test_overlapping_event_supersedes() {
        let a = LinkConfig::new();
        let b = LinkConfig::new();
        let mut driver = ScenarioDriver::new(a.clone(), b.clone(), 100_000);
        driver.add_event(event(0, 10_000, "long"));
        let mut short = event(1_000, 1_000, "short");
        short.delay_ms = 99;
        driver.add_event(short);

        driver.tick(0);
        driver.tick(1_000);
        assert_eq!(driver.current.as_ref().unwrap().description, "short");
        assert_eq!(a.snapshot().delay_ms, 99);
    }

    #[test]
    fn test_finalize_sets_link_down() {
        let a = LinkConfig::new();
        let b = LinkConfig::new();
        let mut driver = ScenarioDriver::new(a.clone(), b.clone(), 3_000);
        assert!(!driver.tick(2_999));
        assert!(driver.tick(3_000));
        for config in [&a, &b] {
            let snap = config.snapshot();
            assert_eq!(snap.bandwidth, Bandwidth::Down);
            assert_eq!(snap.delay_ms, LINK_DOWN_DELAY_MS);
            assert_eq!(snap.loss_per_10000, LINK_DOWN_LOSS);
        }
    }

    #[test]
    fn test_controls_stop_and_pause() {
        let driver = ScenarioDriver::new(LinkConfig::new(), LinkConfig::new(), 1_000);
        let controls = driver.controls();
        assert!(!controls.is_stopped());
        assert!(!controls.is_paused());
        controls.pause();
        assert!(controls.is_paused());
        controls.resume();
        assert!(!controls.is_paused());
        controls.stop();
        assert!(controls.is_stopped());
    }

    #[test]
    fn test_demo_shape() {
        let events = demo_events();
        assert_eq!(events.len(), 8);
        // Contiguous coverage of the full 40 seconds.
        let mut sorted: Vec<_> = events.iter().collect();
        sorted.sort_by_key(|e| e.start_ms);
        let mut cursor = 0;
        for event in sorted {
            assert_eq!(event.start_ms, cursor);
            cursor = event.end_ms();
        }
        assert_eq!(cursor, DEMO_TOTAL_MS);
    }
}
