use std::process::{Command, Output};

use anyhow::{Context, Result, bail};
use tracing::debug;

/// A Linux network namespace with RAII cleanup.
///
/// Creates the namespace on construction, brings up loopback, and deletes
/// it on drop. All commands inside the namespace run via `sudo ip netns exec`.
pub struct Namespace {
    pub name: String,
}

impl Namespace {
    pub fn new(name: &str) -> Result<Self> {
        // Clean up stale namespace with same name (idempotent)
        let _ = sudo(&["ip", "netns", "del", name]);

        sudo_checked(&["ip", "netns", "add", name])
            .with_context(|| format!("create netns '{name}'"))?;

        debug!(ns = name, "created network namespace");

        // Loopback — best-effort, failure is non-fatal
        let _ = sudo(&["ip", "netns", "exec", name, "ip", "link", "set", "lo", "up"]);

        Ok(Self {
            name: name.to_string(),
        })
    }

    /// Run a command inside this namespace, returning raw output.
    pub fn exec(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        let mut full_args = vec!["ip", "netns", "exec", &self.name, cmd];
        full_args.extend_from_slice(args);
        sudo(&full_args).with_context(|| format!("exec '{cmd}' in ns '{}'", self.name))
    }

    /// Run a command inside this namespace, failing if it exits non-zero.
    pub fn exec_checked(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        let output = self.exec(cmd, args)?;
        if !output.status.success() {
            bail!(
                "command failed in ns '{}': {cmd} {}\n{}",
                self.name,
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output)
    }
}

impl Drop for Namespace {
    fn drop(&mut self) {
        debug!(ns = self.name, "deleting network namespace");
        let _ = sudo(&["ip", "netns", "del", &self.name]);
    }
}

/// A veth pair bridging a namespace to the host.
///
/// The namespace end carries the IP; the host end stays in the host
/// namespace, unaddressed, ready to be enslaved to one of the emulator's
/// bridges. Deleting the host end tears down both (veth pairs die
/// together).
pub struct VethPair {
    pub host_iface: String,
    pub ns_iface: String,
}

impl VethPair {
    /// Create `host_iface` <-> `ns_iface`, move the latter into `ns` and
    /// address it with `ns_ip` (CIDR notation).
    ///
    /// Interface names must be <= 15 chars (Linux limit).
    pub fn into_namespace(
        ns: &Namespace,
        host_iface: &str,
        ns_iface: &str,
        ns_ip: &str,
    ) -> Result<Self> {
        // Clean up stale veth (idempotent)
        let _ = sudo(&["ip", "link", "del", host_iface]);

        sudo_checked(&[
            "ip", "link", "add", host_iface, "type", "veth", "peer", "name", ns_iface,
        ])
        .context("create veth pair")?;

        sudo_checked(&["ip", "link", "set", ns_iface, "netns", &ns.name])
            .context("move veth end into namespace")?;
        ns.exec_checked("ip", &["addr", "add", ns_ip, "dev", ns_iface])
            .context("address namespace veth")?;
        ns.exec_checked("ip", &["link", "set", ns_iface, "up"])
            .context("bring namespace veth up")?;

        sudo_checked(&["ip", "link", "set", host_iface, "up"])
            .context("bring host veth up")?;

        debug!(
            host = host_iface,
            ns = ns.name,
            ip = ns_ip,
            "veth pair configured"
        );

        Ok(Self {
            host_iface: host_iface.to_string(),
            ns_iface: ns_iface.to_string(),
        })
    }
}

impl Drop for VethPair {
    fn drop(&mut self) {
        debug!(host = self.host_iface, "deleting veth pair");
        let _ = sudo(&["ip", "link", "del", &self.host_iface]);
    }
}

// -- helpers --

/// Run `sudo <args>`, returning raw output.
pub(crate) fn sudo(args: &[&str]) -> Result<Output> {
    Command::new("sudo")
        .args(args)
        .output()
        .with_context(|| format!("sudo {}", args.join(" ")))
}

/// Run `sudo <args>`, returning output on success or bailing with stderr.
pub(crate) fn sudo_checked(args: &[&str]) -> Result<Output> {
    let output = sudo(args)?;
    if !output.status.success() {
        bail!(
            "command failed: sudo {}\n{}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{check_privileges, unique_name};

    #[test]
    fn test_namespace_has_loopback() {
        if !check_privileges() {
            eprintln!("Skipping: insufficient privileges");
            return;
        }

        let ns = Namespace::new(&unique_name("nst_a")).expect("create ns");
        let out = ns.exec("ip", &["link"]).expect("ip link");
        let stdout = String::from_utf8_lossy(&out.stdout);
        assert!(stdout.contains("lo"), "loopback missing: {stdout}");
    }

    #[test]
    fn test_veth_host_end_stays_in_host() {
        if !check_privileges() {
            eprintln!("Skipping: insufficient privileges");
            return;
        }

        let ns = Namespace::new(&unique_name("nst_v")).expect("create ns");
        let host_if = unique_name("vh");
        let ns_if = unique_name("vn");
        let _pair = VethPair::into_namespace(&ns, &host_if, &ns_if, "10.230.1.1/24")
            .expect("create veth");

        let out = sudo(&["ip", "link", "show", &host_if]).expect("ip link show");
        assert!(out.status.success(), "host end not visible in host ns");
    }
}
