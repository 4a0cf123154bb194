//! Per-direction link parameters.
//!
//! One `LinkConfig` exists per direction. It is written by the scenario
//! driver or the console listener and read by the direction's worker on
//! every frame. Each field is an independent atomic: no invariant spans
//! more than one field, so a momentary inconsistency between bandwidth and
//! delay affects at most one frame's schedule.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Delay applied by the link-down profile when a scenario finalizes.
pub const LINK_DOWN_DELAY_MS: i64 = 10_000;

/// Loss applied by the link-down profile (drop everything).
pub const LINK_DOWN_LOSS: u32 = 10_000;

/// Modeled wire capacity.
///
/// An explicit sum type instead of an overloaded number: `0` meaning
/// "unlimited" and a near-zero value meaning "down" cannot collide here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Bandwidth {
    /// No serializer model; frames depart after propagation delay only.
    #[default]
    Unlimited,
    /// Work-conserving FIFO serializer of this capacity, in bits per second.
    Limited(u64),
    /// Link-down profile: the wire behaves as a 1 bit/s serializer, so
    /// nothing effectively drains.
    Down,
}

impl Bandwidth {
    const DOWN_RAW: u64 = u64::MAX;

    /// Encode for atomic storage: 0 = unlimited, `u64::MAX` = down,
    /// anything else = limited(bps).
    pub const fn as_raw(self) -> u64 {
        match self {
            Bandwidth::Unlimited => 0,
            Bandwidth::Limited(bps) => {
                if bps >= Self::DOWN_RAW { Self::DOWN_RAW - 1 } else { bps }
            }
            Bandwidth::Down => Self::DOWN_RAW,
        }
    }

    pub const fn from_raw(raw: u64) -> Self {
        match raw {
            0 => Bandwidth::Unlimited,
            Self::DOWN_RAW => Bandwidth::Down,
            bps => Bandwidth::Limited(bps),
        }
    }

    /// Serializer capacity in bps, or `None` when no serializer model
    /// applies. `Down` serializes at 1 bit/s.
    pub const fn effective_bps(self) -> Option<u64> {
        match self {
            Bandwidth::Unlimited => None,
            Bandwidth::Limited(bps) => Some(bps),
            Bandwidth::Down => Some(1),
        }
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bandwidth::Unlimited => write!(f, "unlimited"),
            Bandwidth::Limited(bps) => write!(f, "{bps}bps"),
            Bandwidth::Down => write!(f, "down"),
        }
    }
}

/// Snapshot of one direction's parameters for hot-path access.
///
/// Take one snapshot at the top of each shaper call instead of loading
/// each atomic separately mid-computation.
#[derive(Clone, Copy, Debug)]
pub struct LinkSnapshot {
    pub bandwidth: Bandwidth,
    pub delay_ms: i64,
    pub loss_per_10000: u32,
}

/// Shared, lock-free link parameters for one direction.
#[derive(Clone, Default)]
pub struct LinkConfig {
    bandwidth: Arc<AtomicU64>,
    delay_ms: Arc<AtomicU64>,
    loss_per_10000: Arc<AtomicU32>,
}

impl LinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot {
            bandwidth: Bandwidth::from_raw(self.bandwidth.load(Ordering::Relaxed)),
            delay_ms: self.delay_ms.load(Ordering::Relaxed) as i64,
            loss_per_10000: self.loss_per_10000.load(Ordering::Relaxed),
        }
    }

    pub fn set_bandwidth(&self, bandwidth: Bandwidth) {
        self.bandwidth.store(bandwidth.as_raw(), Ordering::Relaxed);
    }

    pub fn set_delay_ms(&self, delay_ms: i64) {
        self.delay_ms.store(delay_ms.max(0) as u64, Ordering::Relaxed);
    }

    pub fn set_loss(&self, loss_per_10000: u32) {
        self.loss_per_10000
            .store(loss_per_10000.min(10_000), Ordering::Relaxed);
    }

    /// Apply a full parameter set, one scalar at a time. Readers may see
    /// a mix of old and new values for one frame; that is acceptable.
    pub fn apply(&self, bandwidth: Bandwidth, delay_ms: i64, loss_per_10000: u32) {
        self.set_bandwidth(bandwidth);
        self.set_delay_ms(delay_ms);
        self.set_loss(loss_per_10000);
    }

    /// Reset to the unimpaired defaults (unlimited, no delay, no loss).
    pub fn reset_defaults(&self) {
        self.apply(Bandwidth::Unlimited, 0, 0);
    }

    /// Apply the synthetic link-down profile used by scenario finalization.
    pub fn set_link_down(&self) {
        self.apply(Bandwidth::Down, LINK_DOWN_DELAY_MS, LINK_DOWN_LOSS);
    }
}
