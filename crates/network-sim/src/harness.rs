use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::test_util::unique_name;
use crate::topology::{Namespace, VethPair, sudo};

/// Captured output of a finished emulator process.
pub struct StackOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// A running emulator wired between two namespaces.
///
/// ```text
/// ns_a [ns veth, 10.77.0.1] --- [host veth] -- bridge_a -- tap_a
///                                                            | emulator
/// ns_b [ns veth, 10.77.0.2] --- [host veth] -- bridge_b -- tap_b
/// ```
///
/// Field order matters for drop: the child is killed before the
/// namespaces and veths disappear.
pub struct EmulatorStack {
    child: Option<Child>,
    pub ns_a: Namespace,
    pub ns_b: Namespace,
    _veth_a: VethPair,
    _veth_b: VethPair,
    bridge_a: String,
    bridge_b: String,
    pub a_ip: &'static str,
    pub b_ip: &'static str,
}

impl EmulatorStack {
    /// Build the topology and spawn the emulator binary (interactive mode
    /// unless `extra_args` says otherwise). Requires passwordless sudo.
    pub fn start(prefix: &str, extra_args: &[&str]) -> Result<Self> {
        let ns_a = Namespace::new(&unique_name(&format!("{prefix}a")))?;
        let ns_b = Namespace::new(&unique_name(&format!("{prefix}b")))?;

        let host_a = unique_name("eha");
        let host_b = unique_name("ehb");
        let veth_a = VethPair::into_namespace(&ns_a, &host_a, "eth0", "10.77.0.1/24")?;
        let veth_b = VethPair::into_namespace(&ns_b, &host_b, "eth0", "10.77.0.2/24")?;

        let tap_a = unique_name("tsa");
        let tap_b = unique_name("tsb");
        let bridge_a = unique_name("bra");
        let bridge_b = unique_name("brb");

        let binary = emulator_binary()?;
        let mut cmd = Command::new("sudo");
        cmd.arg(&binary)
            .args(["--srctap", &tap_a, "--srceth", &host_a, "--srcbr", &bridge_a])
            .args(["--dsttap", &tap_b, "--dsteth", &host_b, "--dstbr", &bridge_b])
            .args(extra_args)
            .env("RUST_LOG", "debug")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!("spawning: {cmd:?}");
        let child = cmd.spawn().context("spawn emulator")?;

        // Give setup (taps, bridges, workers) a moment before traffic.
        std::thread::sleep(Duration::from_millis(1500));

        Ok(Self {
            child: Some(child),
            ns_a,
            ns_b,
            _veth_a: veth_a,
            _veth_b: veth_b,
            bridge_a,
            bridge_b,
            a_ip: "10.77.0.1",
            b_ip: "10.77.0.2",
        })
    }

    /// Send one console command to the emulator's stdin.
    pub fn command(&mut self, line: &str) -> Result<()> {
        let child = self.child.as_mut().context("emulator already stopped")?;
        let stdin = child.stdin.as_mut().context("emulator stdin closed")?;
        writeln!(stdin, "{line}").context("write console command")?;
        stdin.flush().context("flush console command")?;
        Ok(())
    }

    /// Ask the emulator to quit and collect its output.
    pub fn stop(mut self) -> StackOutput {
        let mut child = self.child.take().expect("stop called once");

        // Polite first: console quit, then EOF on stdin.
        if let Some(mut stdin) = child.stdin.take() {
            let _ = writeln!(stdin, "q");
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) => std::thread::sleep(Duration::from_millis(100)),
                Err(_) => break,
            }
        }
        if matches!(child.try_wait(), Ok(None)) {
            let _ = child.kill();
        }

        let output = child.wait_with_output().expect("collect emulator output");
        let lines = |bytes: &[u8]| {
            String::from_utf8_lossy(bytes)
                .lines()
                .map(str::to_string)
                .collect()
        };
        StackOutput {
            stdout: lines(&output.stdout),
            stderr: lines(&output.stderr),
        }
    }
}

impl Drop for EmulatorStack {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        // The emulator normally deletes its bridges on exit; cover the
        // killed-process path too.
        let _ = sudo(&["ip", "link", "del", &self.bridge_a]);
        let _ = sudo(&["ip", "link", "del", &self.bridge_b]);
    }
}

/// Locate the workspace `tapshaper` binary next to the test executable.
fn emulator_binary() -> Result<String> {
    let mut path = std::env::current_exe().context("current exe")?;
    path.pop(); // deps/
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("tapshaper");
    if !path.exists() {
        bail!(
            "emulator binary not found at {} (run `cargo build` first)",
            path.display()
        );
    }
    Ok(path.display().to_string())
}
