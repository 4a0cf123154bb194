//! One side of the emulated link: the TAP handle plus its direction's
//! queue and shaper.
//!
//! The endpoint never blocks. Reads drain under a zero-timeout readiness
//! check; writes to the peer are fire-and-forget. Per-frame failures are
//! logged and the frame discarded; nothing here is fatal.

use std::io;
use std::os::fd::{AsRawFd, RawFd};

use tracing::{trace, warn};

use crate::frame::{Frame, MAX_FRAME_LEN};
use crate::link::LinkConfig;
use crate::queue::{Admission, DelayQueue};
use crate::shaper::LinkShaper;
use crate::stats::DirectionStats;
use crate::tap::{ReadinessPoller, TapDevice, write_frame};
use crate::utils::now_us;

pub struct TapEndpoint {
    dev: TapDevice,
    poller: ReadinessPoller,
    queue: DelayQueue,
    shaper: LinkShaper,
    stats: DirectionStats,
    peer_fd: Option<RawFd>,
}

impl TapEndpoint {
    pub fn new(dev: TapDevice, config: LinkConfig, stats: DirectionStats) -> io::Result<Self> {
        let poller = ReadinessPoller::new(dev.as_raw_fd())?;
        Ok(Self {
            dev,
            poller,
            queue: DelayQueue::new(),
            shaper: LinkShaper::new(config),
            stats,
            peer_fd: None,
        })
    }

    /// Replace the delay queue with one of a different capacity.
    /// Only meaningful before traffic flows.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue = DelayQueue::bounded(capacity);
        self
    }

    /// Swap in a deterministic shaper. Only meaningful before traffic flows.
    pub fn with_shaper(mut self, shaper: LinkShaper) -> Self {
        self.shaper = shaper;
        self
    }

    /// The emulator is symmetric: each endpoint's peer is the other
    /// endpoint's handle.
    pub fn set_peer(&mut self, fd: RawFd) {
        self.peer_fd = Some(fd);
    }

    pub fn name(&self) -> &str {
        self.dev.name()
    }

    pub fn queue(&self) -> &DelayQueue {
        &self.queue
    }

    pub fn stats(&self) -> &DirectionStats {
        &self.stats
    }

    /// Drain currently readable frames into the delay queue.
    ///
    /// Each frame gets its departure computed at read time; admission
    /// tail-drops when the queue is full. Returns the number of frames
    /// read (0 means no progress).
    pub fn poll_once(&mut self) -> usize {
        match self.poller.readable_now() {
            Ok(true) => {}
            Ok(false) => return 0,
            Err(err) => {
                warn!("{}: readiness poll: {err}", self.dev.name());
                return 0;
            }
        }

        let mut admitted = 0;
        loop {
            let mut buf = vec![0u8; MAX_FRAME_LEN];
            let len = match self.dev.read_frame(&mut buf) {
                Ok(0) => break,
                Ok(len) => len,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    // Drop the affected frame and end this drain pass; the
                    // worker retries on its next iteration.
                    warn!("{}: read: {err}", self.dev.name());
                    self.stats.record_read_error();
                    break;
                }
            };
            buf.truncate(len);
            self.stats.record_read(len);

            let arrival = now_us();
            let mut frame = Frame::new(buf, arrival);
            frame.departure_us = self.shaper.schedule(len, arrival);
            trace!(
                "{}: frame len={len} ether_type={:#06x} departs in {}us",
                self.dev.name(),
                frame.ether_type,
                frame.departure_us - arrival
            );

            if self.queue.admit(frame) == Admission::Rejected {
                self.stats.record_tail_drop();
            } else {
                admitted += 1;
            }
        }
        admitted
    }

    /// Release every frame due at `now_us`: drop it on a loss draw, or
    /// write it to the peer. The frame is consumed either way.
    pub fn flush_due(&mut self, now_us: i64) -> usize {
        let Self {
            queue,
            shaper,
            stats,
            peer_fd,
            dev,
            ..
        } = self;

        queue.release_due(now_us, |frame| {
            if shaper.should_drop() {
                trace!("{}: loss drop len={}", dev.name(), frame.len());
                stats.record_loss_drop();
                return;
            }
            let Some(fd) = *peer_fd else {
                warn!("{}: no peer configured, frame discarded", dev.name());
                return;
            };
            match write_frame(fd, &frame.data) {
                Ok(_) => stats.record_forwarded(),
                // Best-effort delivery: a blocked or failed write still
                // consumes the frame.
                Err(err) => {
                    warn!("{}: write to peer: {err}", dev.name());
                    stats.record_write_error();
                }
            }
        })
    }
}
