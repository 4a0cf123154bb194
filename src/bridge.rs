//! Host bridge plumbing for one endpoint.
//!
//! Each TAP interface is enslaved to a Linux bridge together with the
//! physical NIC for its segment, so every frame crossing the bridge is
//! diverted through the emulator. Configuration goes through the `ip`
//! tool; setup failures abort, cleanup is best-effort.

use std::process::{Command, Output};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

/// Names for one side of the emulated link.
#[derive(Clone, Debug)]
pub struct BridgeSpec {
    /// Bridge to create.
    pub bridge: String,
    /// Physical NIC joined to the bridge.
    pub nic: String,
}

/// Create `spec.bridge`, enslave the TAP and the physical NIC to it with
/// spanning tree disabled, and bring everything up.
///
/// Stale state from a previous run is torn down first; those commands are
/// allowed to fail.
pub fn attach(spec: &BridgeSpec, tap_name: &str) -> Result<()> {
    teardown(&spec.bridge);

    ip_checked(&["link", "set", "dev", tap_name, "up"])
        .with_context(|| format!("bring up tap '{tap_name}'"))?;
    ip_checked(&[
        "link", "add", "name", &spec.bridge, "type", "bridge", "stp_state", "0",
    ])
    .with_context(|| format!("create bridge '{}'", spec.bridge))?;
    ip_checked(&["link", "set", tap_name, "master", &spec.bridge])
        .with_context(|| format!("enslave '{tap_name}' to '{}'", spec.bridge))?;
    ip_checked(&["link", "set", &spec.nic, "master", &spec.bridge])
        .with_context(|| format!("enslave '{}' to '{}'", spec.nic, spec.bridge))?;
    ip_checked(&["link", "set", &spec.bridge, "up"])
        .with_context(|| format!("bring up bridge '{}'", spec.bridge))?;

    debug!(
        bridge = spec.bridge,
        tap = tap_name,
        nic = spec.nic,
        "bridge configured"
    );
    Ok(())
}

/// Best-effort removal of a bridge. Enslaved interfaces are released
/// automatically when the bridge goes away.
pub fn teardown(bridge: &str) {
    let _ = ip(&["link", "set", bridge, "down"]);
    if let Err(err) = ip(&["link", "del", bridge]) {
        warn!("bridge '{bridge}' cleanup: {err}");
    }
}

fn ip(args: &[&str]) -> Result<Output> {
    debug!("ip {}", args.join(" "));
    Command::new("ip")
        .args(args)
        .output()
        .with_context(|| format!("ip {}", args.join(" ")))
}

fn ip_checked(args: &[&str]) -> Result<Output> {
    let output = ip(args)?;
    if !output.status.success() {
        bail!(
            "command failed: ip {}\n{}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output)
}
