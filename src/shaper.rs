//! Departure-time computation and the per-release loss decision.
//!
//! The shaper models a work-conserving FIFO serializer of the configured
//! capacity in front of a fixed propagation delay. Serialization finish
//! times accumulate in `last_serialization_end_us`; propagation delay is
//! added afterwards, per frame, so a delay change mid-stream re-times
//! subsequent frames without corrupting the serializer model.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::link::LinkConfig;

/// Per-direction shaping state. Owned and mutated only by the direction's
/// worker; the parameters it reads are shared atomics.
pub struct LinkShaper {
    config: LinkConfig,
    /// Projected wall-clock µs at which the previously admitted frame
    /// finishes serialization. Monotonically non-decreasing.
    last_serialization_end_us: i64,
    rng: StdRng,
}

impl LinkShaper {
    pub fn new(config: LinkConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Deterministic construction for tests.
    pub fn with_rng(config: LinkConfig, rng: StdRng) -> Self {
        Self {
            config,
            last_serialization_end_us: 0,
            rng,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn last_serialization_end_us(&self) -> i64 {
        self.last_serialization_end_us
    }

    /// Departure timestamp for a frame of `size` bytes arriving at `now_us`.
    ///
    /// With a finite bandwidth, the frame cannot begin transmission until
    /// the wire is free and the frame has arrived, hence the `max`. The
    /// serialization finish time is recorded before propagation delay is
    /// added: queueing delay and propagation delay compose additively.
    pub fn schedule(&mut self, size: usize, now_us: i64) -> i64 {
        let snap = self.config.snapshot();
        match snap.bandwidth.effective_bps() {
            Some(bps) => {
                let serialize_us = (size as u64 * 8 * 1_000_000).div_ceil(bps) as i64;
                let finish = self.last_serialization_end_us.max(now_us) + serialize_us;
                self.last_serialization_end_us = finish;
                finish + snap.delay_ms * 1000
            }
            None => now_us + snap.delay_ms * 1000,
        }
    }

    /// The per-release Bernoulli loss draw: one uniform integer in
    /// [1, 10000], dropping when it falls at or below the configured loss.
    ///
    /// Drawn at release rather than admission so that loss raised after a
    /// frame was queued still applies to it.
    pub fn should_drop(&mut self) -> bool {
        let loss = self.config.snapshot().loss_per_10000;
        loss > 0 && self.rng.random_range(1..=10_000) <= loss
    }
}
