//! Interactive parameter control.
//!
//! Reads line commands from stdin on a dedicated thread and applies them
//! to both directions:
//!
//! - `b <bps>` - bandwidth ceiling (0 = unlimited)
//! - `r <rtt_ms>` - round-trip delay, split across the directions
//! - `l <loss_per_10000>` - loss probability
//! - `status` - current parameters and counters as JSON
//! - `q` / `quit` - terminate

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::link::{Bandwidth, LinkConfig};
use crate::stats::EmulatorStats;

/// What the caller should do after a command was applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplOutcome {
    Continue,
    Quit,
}

pub fn spawn_repl(
    a_to_b: LinkConfig,
    b_to_a: LinkConfig,
    stats: EmulatorStats,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines().map_while(Result::ok) {
                if apply_cmd(&line, &a_to_b, &b_to_a, &stats) == ReplOutcome::Quit {
                    break;
                }
            }
            // Quit command or closed stdin both end the run.
            stop.store(true, Ordering::Relaxed);
        })
        .expect("spawn console thread")
}

/// Apply one console command to both directions.
pub fn apply_cmd(
    line: &str,
    a_to_b: &LinkConfig,
    b_to_a: &LinkConfig,
    stats: &EmulatorStats,
) -> ReplOutcome {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return ReplOutcome::Continue;
    };

    match cmd {
        "b" => match parts.next().map(str::parse::<u64>) {
            Some(Ok(bps)) => {
                let bandwidth = match bps {
                    0 => Bandwidth::Unlimited,
                    bps => Bandwidth::Limited(bps),
                };
                a_to_b.set_bandwidth(bandwidth);
                b_to_a.set_bandwidth(bandwidth);
                info!("bandwidth: {bandwidth}");
            }
            _ => warn!("usage: b <bps>  (0 = unlimited)"),
        },

        "r" => match parts.next().map(str::parse::<i64>) {
            Some(Ok(rtt_ms)) if rtt_ms >= 0 => {
                // Compatibility: the value lands in the per-direction
                // delay_ms slot scaled by 1000/2, so `r 100` behaves as a
                // 50000 ms one-way delay. Kept as-is for parity with
                // existing drive scripts.
                let per_direction = rtt_ms * 1000 / 2;
                a_to_b.set_delay_ms(per_direction);
                b_to_a.set_delay_ms(per_direction);
                info!("rtt: {rtt_ms} ({per_direction} per direction)");
            }
            _ => warn!("usage: r <rtt_ms>"),
        },

        "l" => match parts.next().map(str::parse::<u32>) {
            Some(Ok(loss)) => {
                a_to_b.set_loss(loss);
                b_to_a.set_loss(loss);
                info!("loss: {loss}/10000");
            }
            _ => warn!("usage: l <loss_per_10000>"),
        },

        "status" => {
            let a = a_to_b.snapshot();
            let b = b_to_a.snapshot();
            info!(
                "a->b: bandwidth {}, delay {}ms, loss {}/10000",
                a.bandwidth, a.delay_ms, a.loss_per_10000
            );
            info!(
                "b->a: bandwidth {}, delay {}ms, loss {}/10000",
                b.bandwidth, b.delay_ms, b.loss_per_10000
            );
            info!("counters: {}", stats.to_json());
        }

        "q" | "quit" => {
            info!("quit");
            return ReplOutcome::Quit;
        }

        other => {
            warn!("unknown command '{other}': use b <bps>, r <rtt_ms>, l <loss>, status, q");
        }
    }
    ReplOutcome::Continue
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (LinkConfig, LinkConfig, EmulatorStats) {
        (LinkConfig::new(), LinkConfig::new(), EmulatorStats::new())
    }

    #[test]
    fn test_bandwidth_applies_to_both_directions() {
        let (a, b, stats) = fixture();
        assert_eq!(apply_cmd("b 8000000", &a, &b, &stats), ReplOutcome::Continue);
        assert_eq!(a.snapshot().bandwidth, Bandwidth::Limited(8_000_000));
        assert_eq!(b.snapshot().bandwidth, Bandwidth::Limited(8_000_000));
    }

    #[test]
    fn test_bandwidth_zero_is_unlimited() {
        let (a, b, stats) = fixture();
        apply_cmd("b 8000000", &a, &b, &stats);
        apply_cmd("b 0", &a, &b, &stats);
        assert_eq!(a.snapshot().bandwidth, Bandwidth::Unlimited);
    }

    #[test]
    fn test_rtt_keeps_historical_scaling() {
        let (a, b, stats) = fixture();
        apply_cmd("r 100", &a, &b, &stats);
        // 100 * 1000 / 2, stored in the delay_ms slot.
        assert_eq!(a.snapshot().delay_ms, 50_000);
        assert_eq!(b.snapshot().delay_ms, 50_000);
    }

    #[test]
    fn test_loss_applies_to_both_directions() {
        let (a, b, stats) = fixture();
        apply_cmd("l 500", &a, &b, &stats);
        assert_eq!(a.snapshot().loss_per_10000, 500);
        assert_eq!(b.snapshot().loss_per_10000, 500);
    }

    #[test]
    fn test_quit_variants() {
        let (a, b, stats) = fixture();
        assert_eq!(apply_cmd("q", &a, &b, &stats), ReplOutcome::Quit);
        assert_eq!(apply_cmd("quit", &a, &b, &stats), ReplOutcome::Quit);
    }

    #[test]
    fn test_bad_input_leaves_parameters_untouched() {
        let (a, b, stats) = fixture();
        apply_cmd("b 1000", &a, &b, &stats);
        for bad in ["b", "b fast", "r -5", "r", "l many", "frobnicate 3", ""] {
            assert_eq!(apply_cmd(bad, &a, &b, &stats), ReplOutcome::Continue);
        }
        assert_eq!(a.snapshot().bandwidth, Bandwidth::Limited(1_000));
        assert_eq!(a.snapshot().delay_ms, 0);
        assert_eq!(a.snapshot().loss_per_10000, 0);
    }

    #[test]
    fn test_status_is_not_quit() {
        let (a, b, stats) = fixture();
        assert_eq!(apply_cmd("status", &a, &b, &stats), ReplOutcome::Continue);
    }
}
