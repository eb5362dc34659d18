//! Process load reporting.
//!
//! The memory figure is the resident set size from `/proc/self/status`
//! (`VmRSS`, in KiB). On platforms without procfs the probe reports `0`,
//! which never trips a memory budget.

use std::fs;

const STATUS_PATH: &str = "/proc/self/status";

/// Snapshot returned by [`StorageGateway::load`](crate::storage::StorageGateway::load).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Load {
    /// Resident memory of the process in KiB; `0` when unavailable.
    pub memory_kib: u64,
    /// Entries currently held by the policy.
    pub resident: usize,
}

/// Resident set size of this process in KiB, or `0` when unavailable.
pub fn resident_memory_kib() -> u64 {
    fs::read_to_string(STATUS_PATH)
        .ok()
        .and_then(|status| parse_vm_rss(&status))
        .unwrap_or(0)
}

/// Extracts the `VmRSS:` value from a `/proc/<pid>/status` dump.
pub(crate) fn parse_vm_rss(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|digits| digits.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_vm_rss_reads_kib() {
        let status = "Name:\tshardkv\nVmPeak:\t  20000 kB\nVmRSS:\t   12345 kB\nThreads:\t4\n";
        assert_eq!(parse_vm_rss(status), Some(12345));
    }

    #[test]
    fn parse_vm_rss_missing_line() {
        assert_eq!(parse_vm_rss("Name:\tshardkv\n"), None);
        assert_eq!(parse_vm_rss("VmRSS:\t  kB\n"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn probe_reports_nonzero_on_linux() {
        assert!(resident_memory_kib() > 0);
    }
}
