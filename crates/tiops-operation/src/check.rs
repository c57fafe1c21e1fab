//! Host pre-flight checks.
//!
//! The insight collector runs on each host and prints a JSON document;
//! further probes capture ulimits, sysctl values and service states.
//! Each parser turns raw output into [`CheckResult`]s; warnings are
//! reported but do not fail the procedure.

use serde::Deserialize;

/// Which optional checks to perform.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckOptions {
    /// Enable the CPU thread-count check.
    pub enable_cpu: bool,
    /// Enable the memory-size check.
    pub enable_mem: bool,
}

/// Names of the check kinds.
pub mod check_type {
    /// Errors that fit no specific check.
    pub const GENERAL: &str = "general";
    /// NTP synchronization status.
    pub const NTP: &str = "ntp";
    /// OS vendor and version.
    pub const OS_VERSION: &str = "os-version";
    /// Swap enablement.
    pub const SWAP: &str = "swap";
    /// Kernel parameters.
    pub const SYSCTL: &str = "sysctl";
    /// CPU thread count.
    pub const CPU_THREADS: &str = "cpu-cores";
    /// CPU frequency governor.
    pub const CPU_GOVERNOR: &str = "cpu-governor";
    /// Memory size.
    pub const MEMORY: &str = "memory";
    /// ulimit configuration.
    pub const LIMITS: &str = "limits";
    /// systemd service states.
    pub const SERVICE: &str = "service";
}

/// Outcome of a single check on a single host.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the check, one of [`check_type`].
    pub name: &'static str,
    /// The failure, when the check did not pass.
    pub error: Option<String>,
    /// The check failed but is not fatal.
    pub warn: bool,
}

impl CheckResult {
    fn pass(name: &'static str) -> Self {
        Self {
            name,
            error: None,
            warn: false,
        }
    }

    fn fail(name: &'static str, error: impl Into<String>) -> Self {
        Self {
            name,
            error: Some(error.into()),
            warn: false,
        }
    }

    fn warning(name: &'static str, error: impl Into<String>) -> Self {
        Self {
            name,
            error: Some(error.into()),
            warn: true,
        }
    }

    /// True when the check passed.
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }

    /// True when the failure is only advisory.
    pub fn is_warning(&self) -> bool {
        self.warn
    }
}

impl std::fmt::Display for CheckResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error {
            None => write!(f, "check passed for {}", self.name),
            Some(e) => write!(f, "check failed for {}: {}", self.name, e),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct InsightInfo {
    #[serde(default)]
    sysinfo: SysInfo,
    #[serde(default)]
    ntp: TimeStat,
}

#[derive(Debug, Default, Deserialize)]
struct SysInfo {
    #[serde(default)]
    os: OsInfo,
    #[serde(default)]
    cpu: CpuInfo,
    #[serde(default)]
    memory: MemInfo,
}

#[derive(Debug, Default, Deserialize)]
struct OsInfo {
    #[serde(default)]
    name: String,
    #[serde(default)]
    vendor: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    release: String,
}

#[derive(Debug, Default, Deserialize)]
struct CpuInfo {
    #[serde(default)]
    threads: u32,
    #[serde(default)]
    governor: String,
}

#[derive(Debug, Default, Deserialize)]
struct MemInfo {
    /// Physical memory in MB.
    #[serde(default)]
    size: u64,
    /// Swap size in MB.
    #[serde(default)]
    swap: u64,
}

#[derive(Debug, Default, Deserialize)]
struct TimeStat {
    #[serde(default)]
    status: String,
    /// Clock offset against NTP, in milliseconds.
    #[serde(default)]
    offset: f64,
}

/// Interprets the insight collector's JSON output.
pub fn check_system_info(opt: &CheckOptions, raw: &[u8]) -> Vec<CheckResult> {
    let info: InsightInfo = match serde_json::from_slice(raw) {
        Ok(info) => info,
        Err(e) => return vec![CheckResult::fail(check_type::GENERAL, e.to_string())],
    };

    let mut results = Vec::new();

    // OS vendor and version.
    let os = &info.sysinfo.os;
    results.push(match os.vendor.as_str() {
        "centos" | "redhat" => {
            let major: u32 = os
                .version
                .split('.')
                .next()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            if major < 7 {
                CheckResult::fail(
                    check_type::OS_VERSION,
                    format!("{} {} not supported, use version 7 or higher", os.name, os.release),
                )
            } else {
                CheckResult::pass(check_type::OS_VERSION)
            }
        }
        "debian" | "ubuntu" => CheckResult::pass(check_type::OS_VERSION),
        vendor => CheckResult::fail(
            check_type::OS_VERSION,
            format!("os vendor {} not supported", vendor),
        ),
    });

    // CPU thread count and governor.
    if opt.enable_cpu && info.sysinfo.cpu.threads < 16 {
        results.push(CheckResult::fail(
            check_type::CPU_THREADS,
            format!(
                "CPU thread count {} too low, needs 16 or more",
                info.sysinfo.cpu.threads
            ),
        ));
    }
    let governor = &info.sysinfo.cpu.governor;
    if !governor.is_empty() && governor != "performance" {
        results.push(CheckResult::fail(
            check_type::CPU_GOVERNOR,
            format!("CPU frequency governor is {}, should use performance", governor),
        ));
    }

    // Memory and swap.
    if info.sysinfo.memory.swap > 0 {
        results.push(CheckResult::warning(
            check_type::SWAP,
            "swap is enabled, please disable for best performance",
        ));
    }
    if opt.enable_mem && info.sysinfo.memory.size < 32 * 1024 {
        results.push(CheckResult::fail(
            check_type::MEMORY,
            format!(
                "memory size {}MB too low, needs 32GB or more",
                info.sysinfo.memory.size
            ),
        ));
    }

    // NTP offset within +-500ms.
    if info.ntp.status.is_empty() || info.ntp.status == "none" {
        results.push(CheckResult::pass(check_type::NTP));
    } else if info.ntp.offset.abs() >= 500.0 {
        results.push(CheckResult::fail(
            check_type::NTP,
            format!("time offset {}ms too high", info.ntp.offset),
        ));
    } else {
        results.push(CheckResult::pass(check_type::NTP));
    }

    results
}

/// Interprets `/etc/security/limits.conf` content for `user`.
pub fn check_sys_limits(_opt: &CheckOptions, user: &str, raw: &[u8]) -> Vec<CheckResult> {
    let mut nofile_soft = 0i64;
    let mut nofile_hard = 0i64;
    let mut stack_soft = 0i64;

    for line in String::from_utf8_lossy(raw).lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[0] != user {
            continue;
        }
        let value: i64 = fields[3].parse().unwrap_or(0);
        match (fields[1], fields[2]) {
            ("soft", "nofile") => nofile_soft = value,
            ("hard", "nofile") => nofile_hard = value,
            ("soft", "stack") => stack_soft = value,
            _ => {}
        }
    }

    let mut results = Vec::new();
    if nofile_soft < 1_000_000 {
        results.push(CheckResult::fail(
            check_type::LIMITS,
            format!("soft limit of nofile for user {} is not set or too low", user),
        ));
    }
    if nofile_hard < 1_000_000 {
        results.push(CheckResult::fail(
            check_type::LIMITS,
            format!("hard limit of nofile for user {} is not set or too low", user),
        ));
    }
    if stack_soft < 10240 {
        results.push(CheckResult::fail(
            check_type::LIMITS,
            format!("soft limit of stack for user {} is not set or too low", user),
        ));
    }
    if results.is_empty() {
        results.push(CheckResult::pass(check_type::LIMITS));
    }
    results
}

/// Interprets `sysctl -a` output.
pub fn check_kernel_params(opt: &CheckOptions, raw: &[u8]) -> Vec<CheckResult> {
    let mut results = Vec::new();

    for line in String::from_utf8_lossy(raw).lines() {
        let fields: Vec<&str> = line.trim().split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        let value: i64 = fields[2].parse().unwrap_or(0);
        let failure = match fields[0] {
            "fs.file-max" if value < 1_000_000 => {
                Some(format!("fs.file-max = {}, should be greater than 1000000", value))
            }
            "net.core.somaxconn" if value < 32768 => {
                Some(format!("net.core.somaxconn = {}, should be greater than 32768", value))
            }
            "net.ipv4.tcp_tw_recycle" if value != 0 => {
                Some(format!("net.ipv4.tcp_tw_recycle = {}, should be 0", value))
            }
            "net.ipv4.tcp_syncookies" if value != 0 => {
                Some(format!("net.ipv4.tcp_syncookies = {}, should be 0", value))
            }
            "vm.overcommit_memory" if opt.enable_mem && value != 0 && value != 1 => {
                Some(format!("vm.overcommit_memory = {}, should be 0 or 1", value))
            }
            "vm.swappiness" if value != 0 => {
                Some(format!("vm.swappiness = {}, should be 0", value))
            }
            _ => None,
        };
        if let Some(msg) = failure {
            results.push(CheckResult::fail(check_type::SYSCTL, msg));
        }
    }

    if results.is_empty() {
        results.push(CheckResult::pass(check_type::SYSCTL));
    }
    results
}

/// Interprets `systemctl list-units --type service --all` output.
///
/// `irqbalance` should be running; `firewalld` should not.
pub fn check_services(raw: &[u8]) -> Vec<CheckResult> {
    let mut irqbalance_active = false;
    let mut firewalld_active = false;

    for line in String::from_utf8_lossy(raw).lines() {
        let fields: Vec<&str> = line.trim().split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        let unit = fields[0].trim_start_matches('●').trim();
        let active = fields.iter().any(|f| *f == "active");
        if unit.starts_with("irqbalance") {
            irqbalance_active = active;
        } else if unit.starts_with("firewalld") {
            firewalld_active = active;
        }
    }

    let mut results = Vec::new();
    if irqbalance_active {
        results.push(CheckResult::pass(check_type::SERVICE));
    } else {
        results.push(CheckResult::warning(
            check_type::SERVICE,
            "service irqbalance is not running, should be enabled",
        ));
    }
    if firewalld_active {
        results.push(CheckResult::fail(
            check_type::SERVICE,
            "service firewalld is running, should be stopped",
        ));
    } else {
        results.push(CheckResult::pass(check_type::SERVICE));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insight_centos7_passes() {
        let raw = br#"{
            "sysinfo": {
                "os": {"name": "CentOS Linux 7", "vendor": "centos", "version": "7.8", "release": "7.8.2003"},
                "cpu": {"threads": 32, "governor": "performance"},
                "memory": {"size": 65536, "swap": 0}
            },
            "ntp": {"status": "synchronized", "offset": 1.5}
        }"#;
        let results = check_system_info(
            &CheckOptions {
                enable_cpu: true,
                enable_mem: true,
            },
            raw,
        );
        assert!(results.iter().all(|r| r.passed()), "{results:?}");
    }

    #[test]
    fn test_insight_flags_swap_as_warning() {
        let raw = br#"{
            "sysinfo": {
                "os": {"vendor": "ubuntu", "version": "20.04"},
                "memory": {"size": 65536, "swap": 2048}
            },
            "ntp": {"status": "none"}
        }"#;
        let results = check_system_info(&CheckOptions::default(), raw);
        let swap = results.iter().find(|r| r.name == check_type::SWAP).unwrap();
        assert!(!swap.passed());
        assert!(swap.is_warning());
    }

    #[test]
    fn test_insight_old_centos_fails() {
        let raw = br#"{"sysinfo": {"os": {"vendor": "centos", "version": "6.5", "name": "CentOS 6", "release": "6.5"}}}"#;
        let results = check_system_info(&CheckOptions::default(), raw);
        let os = results
            .iter()
            .find(|r| r.name == check_type::OS_VERSION)
            .unwrap();
        assert!(!os.passed());
        assert!(!os.is_warning());
    }

    #[test]
    fn test_insight_garbage_is_general_error() {
        let results = check_system_info(&CheckOptions::default(), b"not json");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, check_type::GENERAL);
    }

    #[test]
    fn test_limits_pass_and_fail() {
        let good = b"tidb soft nofile 1000000\ntidb hard nofile 1000000\ntidb soft stack 10240\n";
        let results = check_sys_limits(&CheckOptions::default(), "tidb", good);
        assert!(results.iter().all(|r| r.passed()));

        let bad = b"# nothing configured\n";
        let results = check_sys_limits(&CheckOptions::default(), "tidb", bad);
        assert_eq!(results.iter().filter(|r| !r.passed()).count(), 3);
    }

    #[test]
    fn test_sysctl_flags_bad_values() {
        let raw = b"fs.file-max = 65535\nnet.core.somaxconn = 65535\nvm.swappiness = 60\n";
        let results = check_kernel_params(&CheckOptions::default(), raw);
        let failures: Vec<_> = results.iter().filter(|r| !r.passed()).collect();
        assert_eq!(failures.len(), 2);
        assert!(failures[0].error.as_deref().unwrap().contains("fs.file-max"));
        assert!(failures[1].error.as_deref().unwrap().contains("vm.swappiness"));
    }

    #[test]
    fn test_services_irqbalance_on_firewalld_off() {
        let raw =
            b"irqbalance.service loaded active running irqbalance daemon\nfirewalld.service loaded inactive dead firewalld\n";
        let results = check_services(raw);
        assert!(results.iter().all(|r| r.passed()));

        let raw =
            b"irqbalance.service loaded inactive dead irqbalance daemon\nfirewalld.service loaded active running firewalld\n";
        let results = check_services(raw);
        assert!(results[0].is_warning());
        assert!(!results[1].passed() && !results[1].is_warning());
    }
}
