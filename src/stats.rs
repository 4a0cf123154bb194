//! Per-direction forwarding counters.
//!
//! Updated lock-free from the worker hot path, snapshotted on demand by the
//! console `status` command and at shutdown. Raw counts only; consumers
//! derive rates themselves.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
struct Counters {
    frames_read: AtomicU64,
    bytes_read: AtomicU64,
    frames_forwarded: AtomicU64,
    loss_drops: AtomicU64,
    tail_drops: AtomicU64,
    read_errors: AtomicU64,
    write_errors: AtomicU64,
}

/// Counter snapshot for one direction.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct DirectionSnapshot {
    pub frames_read: u64,
    pub bytes_read: u64,
    pub frames_forwarded: u64,
    /// Frames discarded by the release-time loss draw.
    pub loss_drops: u64,
    /// Frames discarded because the delay queue was at capacity.
    pub tail_drops: u64,
    pub read_errors: u64,
    pub write_errors: u64,
}

/// Lock-free counters for one direction. Clones share storage.
#[derive(Clone, Default)]
pub struct DirectionStats {
    inner: Arc<Counters>,
}

impl DirectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_read(&self, bytes: usize) {
        self.inner.frames_read.fetch_add(1, Ordering::Relaxed);
        self.inner
            .bytes_read
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_forwarded(&self) {
        self.inner.frames_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_loss_drop(&self) {
        self.inner.loss_drops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tail_drop(&self) {
        self.inner.tail_drops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_read_error(&self) {
        self.inner.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_write_error(&self) {
        self.inner.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DirectionSnapshot {
        DirectionSnapshot {
            frames_read: self.inner.frames_read.load(Ordering::Relaxed),
            bytes_read: self.inner.bytes_read.load(Ordering::Relaxed),
            frames_forwarded: self.inner.frames_forwarded.load(Ordering::Relaxed),
            loss_drops: self.inner.loss_drops.load(Ordering::Relaxed),
            tail_drops: self.inner.tail_drops.load(Ordering::Relaxed),
            read_errors: self.inner.read_errors.load(Ordering::Relaxed),
            write_errors: self.inner.write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Both directions, as exported by the console `status` command.
#[derive(Clone, Debug, Serialize)]
pub struct StatsSnapshot {
    pub a_to_b: DirectionSnapshot,
    pub b_to_a: DirectionSnapshot,
}

/// Counter pair for the whole emulator.
#[derive(Clone, Default)]
pub struct EmulatorStats {
    pub a_to_b: DirectionStats,
    pub b_to_a: DirectionStats,
}

impl EmulatorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            a_to_b: self.a_to_b.snapshot(),
            b_to_a: self.b_to_a.snapshot(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}
