//! Shared utilities for integration tests.
#![allow(dead_code)]

use network_sim::check_privileges;

/// Check end-to-end test dependencies. Returns `true` if tests should be
/// skipped (prints the reason to stderr). Use at the top of every test.
pub fn skip_without_deps() -> bool {
    if !check_privileges() {
        eprintln!("Skipping: needs ip, passwordless sudo and /dev/net/tun");
        return true;
    }
    false
}

/// Build the tapshaper binary (debug mode). Call once before tests that
/// need the binary. Panics if the build fails.
pub fn build_tapshaper() {
    let status = std::process::Command::new("cargo")
        .args(["build", "--bin", "tapshaper"])
        .status()
        .expect("failed to run cargo build");
    assert!(status.success(), "cargo build failed");
}

/// Collect and print all process output for debugging failed tests.
pub fn dump_output(output: &network_sim::StackOutput) {
    eprintln!("--- tapshaper stdout ---");
    for line in &output.stdout {
        eprintln!("  {line}");
    }
    eprintln!("--- tapshaper stderr ---");
    for line in &output.stderr {
        eprintln!("  {line}");
    }
}

/// Average RTT in ms reported by `ping` output, if present.
pub fn parse_ping_avg_rtt(output: &str) -> Option<f32> {
    // "rtt min/avg/max/mdev = 99.915/100.123/100.331/0.208 ms"
    let line = output.lines().find(|l| l.contains("min/avg/max"))?;
    let values = line.split('=').nth(1)?.trim();
    values.split('/').nth(1)?.parse().ok()
}
