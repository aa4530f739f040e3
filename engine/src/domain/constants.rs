//! Shared defaults and static lookup tables.

use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const MAX_NAME_LEN: usize = 255;

pub const DEFAULT_RESTART_DELAY_SEC: u64 = 1;
pub const DEFAULT_RESTART_MAX_DELAY_SEC: u64 = 300;
pub const DEFAULT_START_LIMIT_BURST: u32 = 5;
pub const DEFAULT_START_LIMIT_INTERVAL_SEC: u64 = 10;
pub const DEFAULT_TIMEOUT_START_SEC: u64 = 0;
pub const DEFAULT_TIMEOUT_STOP_SEC: u64 = 10;
pub const DEFAULT_KILL_SIGNAL: &str = "SIGTERM";
pub const SUCCESS_EXIT_CODE: i32 = 0;

/// Known Linux capability names, used to validate `ambient_capabilities`
/// before any process is created. Raising them happens at spawn time.
pub static LINUX_CAPABILITIES: &[&str] = &[
    "CAP_AUDIT_CONTROL",
    "CAP_AUDIT_READ",
    "CAP_AUDIT_WRITE",
    "CAP_BLOCK_SUSPEND",
    "CAP_BPF",
    "CAP_CHECKPOINT_RESTORE",
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_DAC_READ_SEARCH",
    "CAP_FOWNER",
    "CAP_FSETID",
    "CAP_IPC_LOCK",
    "CAP_IPC_OWNER",
    "CAP_KILL",
    "CAP_LEASE",
    "CAP_LINUX_IMMUTABLE",
    "CAP_MAC_ADMIN",
    "CAP_MAC_OVERRIDE",
    "CAP_MKNOD",
    "CAP_NET_ADMIN",
    "CAP_NET_BIND_SERVICE",
    "CAP_NET_BROADCAST",
    "CAP_NET_RAW",
    "CAP_PERFMON",
    "CAP_SETFCAP",
    "CAP_SETGID",
    "CAP_SETPCAP",
    "CAP_SETUID",
    "CAP_SYSLOG",
    "CAP_SYS_ADMIN",
    "CAP_SYS_BOOT",
    "CAP_SYS_CHROOT",
    "CAP_SYS_MODULE",
    "CAP_SYS_NICE",
    "CAP_SYS_PACCT",
    "CAP_SYS_PTRACE",
    "CAP_SYS_RAWIO",
    "CAP_SYS_RESOURCE",
    "CAP_SYS_TIME",
    "CAP_SYS_TTY_CONFIG",
    "CAP_WAKE_ALARM",
];

/// Signal name to number map for `kill_signal` resolution.
pub static SIGNALS: Lazy<HashMap<&'static str, i32>> = Lazy::new(|| {
    HashMap::from([
        ("SIGHUP", libc::SIGHUP),
        ("SIGINT", libc::SIGINT),
        ("SIGQUIT", libc::SIGQUIT),
        ("SIGKILL", libc::SIGKILL),
        ("SIGUSR1", libc::SIGUSR1),
        ("SIGUSR2", libc::SIGUSR2),
        ("SIGTERM", libc::SIGTERM),
    ])
});

/// Resolve a signal name to its number, if known.
pub fn signal_number(name: &str) -> Option<i32> {
    SIGNALS.get(name).copied()
}

pub fn is_known_capability(name: &str) -> bool {
    LINUX_CAPABILITIES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_lookup() {
        assert_eq!(signal_number("SIGTERM"), Some(libc::SIGTERM));
        assert_eq!(signal_number("SIGKILL"), Some(libc::SIGKILL));
        assert_eq!(signal_number("SIGFOO"), None);
    }

    #[test]
    fn test_capability_allow_list() {
        assert!(is_known_capability("CAP_NET_BIND_SERVICE"));
        assert!(!is_known_capability("CAP_TIME_TRAVEL"));
    }
}
