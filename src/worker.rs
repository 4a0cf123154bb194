//! The per-direction forwarding loop.
//!
//! Busy-polls on purpose: the program's whole job is to inject precise
//! delay, and an OS sleep on the hot path would contaminate it. When a
//! pass makes no progress the loop yields a spin hint only.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use crate::endpoint::TapEndpoint;
use crate::utils::now_us;

/// Run `endpoint` on a dedicated thread until `stop` is set.
///
/// The endpoint (and every frame still queued in it) is dropped when the
/// loop exits, which frees all remaining buffers.
pub fn spawn(
    mut endpoint: TapEndpoint,
    stop: Arc<AtomicBool>,
    direction: &str,
) -> JoinHandle<()> {
    let name = format!("fwd-{direction}");
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            info!("{name}: forwarding {}", endpoint.name());
            while !stop.load(Ordering::Relaxed) {
                let read = endpoint.poll_once();
                let released = endpoint.flush_due(now_us());
                if read == 0 && released == 0 {
                    std::hint::spin_loop();
                }
            }
            debug!(
                "{name}: stopped with {} frames still queued",
                endpoint.queue().len()
            );
        })
        .expect("spawn worker thread")
}
