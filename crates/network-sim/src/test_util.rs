use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};

static NAME_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Returns `true` if the environment supports end-to-end emulator tests:
/// the `ip` tool, passwordless `sudo`, and the TUN/TAP device node.
pub fn check_privileges() -> bool {
    let has_ip = Command::new("ip")
        .arg("netns")
        .output()
        .is_ok_and(|o| o.status.success());

    has_ip
        && Path::new("/dev/net/tun").exists()
        && Command::new("sudo")
            .args(["-n", "ip", "netns", "list"])
            .output()
            .is_ok_and(|o| o.status.success())
}

/// Generate a unique namespace/interface name safe for parallel tests.
///
/// Combines prefix + PID + atomic counter. The uniqueness suffix
/// (`_{pid:x}_{seq}`) is always preserved; the prefix is truncated
/// if the total would exceed 15 chars (Linux netdev name limit).
pub fn unique_name(prefix: &str) -> String {
    let seq = NAME_COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id() % 0xffff;
    let suffix = format!("_{pid:x}_{seq}");
    let max_prefix = 15_usize.saturating_sub(suffix.len());
    let truncated_prefix = &prefix[..prefix.len().min(max_prefix)];
    format!("{truncated_prefix}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_names_differ() {
        assert_ne!(unique_name("x"), unique_name("x"));
    }

    #[test]
    fn test_unique_name_respects_netdev_limit() {
        let name = unique_name("averylongprefixindeed");
        assert!(name.len() <= 15, "{name} too long");
    }
}
