//! Host gauges sampled once per flush.

/// Instantaneous host readings. Unavailable readings are 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemGauges {
    /// 1-minute load average divided by the logical core count.
    pub load1m_normalized: f64,
    /// `(total - free) / total * 100`
    pub memory_used_percent: f64,
}

/// Source of [`SystemGauges`]; swapped out in tests.
pub trait SystemProbe: Send + Sync {
    fn sample(&self) -> SystemGauges;
}

/// Reads `/proc/loadavg` and `/proc/meminfo` on Linux; zeros elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProbe;

impl SystemProbe for OsProbe {
    fn sample(&self) -> SystemGauges {
        let cores = num_cpus::get().max(1);
        SystemGauges {
            load1m_normalized: read_proc("/proc/loadavg")
                .and_then(|s| parse_loadavg(&s))
                .map(|load| normalize_load(load, cores))
                .unwrap_or(0.0),
            memory_used_percent: read_proc("/proc/meminfo")
                .and_then(|s| parse_meminfo(&s))
                .map(|(total, free)| memory_used_percent(total, free))
                .unwrap_or(0.0),
        }
    }
}

fn read_proc(path: &str) -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string(path).ok()
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = path;
        None
    }
}

/// First field of `/proc/loadavg`.
pub fn parse_loadavg(content: &str) -> Option<f64> {
    content.split_whitespace().next()?.parse().ok()
}

/// `(MemTotal, free)` in kB. "Free" prefers `MemAvailable`, which counts
/// reclaimable cache, and falls back to `MemFree` on old kernels.
pub fn parse_meminfo(content: &str) -> Option<(u64, u64)> {
    let mut total = None;
    let mut available = None;
    let mut free = None;

    for line in content.lines() {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let value = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok());
        match name {
            "MemTotal" => total = value,
            "MemAvailable" => available = value,
            "MemFree" => free = value,
            _ => {}
        }
    }

    Some((total?, available.or(free)?))
}

pub fn normalize_load(load: f64, cores: usize) -> f64 {
    let normalized = load / cores.max(1) as f64;
    if normalized.is_finite() {
        normalized
    } else {
        0.0
    }
}

pub fn memory_used_percent(total: u64, free: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let used = total.saturating_sub(free) as f64;
    let pct = used / total as f64 * 100.0;
    if pct.is_finite() {
        pct
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:       16000000 kB\n\
                           MemFree:         2000000 kB\n\
                           MemAvailable:    4000000 kB\n\
                           Buffers:          100000 kB\n";

    #[test]
    fn parses_loadavg() {
        assert_eq!(parse_loadavg("1.50 0.80 0.40 2/345 6789\n"), Some(1.5));
        assert_eq!(parse_loadavg(""), None);
        assert_eq!(parse_loadavg("garbage"), None);
    }

    #[test]
    fn parses_meminfo_preferring_available() {
        assert_eq!(parse_meminfo(MEMINFO), Some((16_000_000, 4_000_000)));
        let old = "MemTotal: 1000 kB\nMemFree: 250 kB\n";
        assert_eq!(parse_meminfo(old), Some((1000, 250)));
        assert_eq!(parse_meminfo("Buffers: 1 kB\n"), None);
    }

    #[test]
    fn load_is_divided_by_cores() {
        assert_eq!(normalize_load(2.0, 4), 0.5);
        assert_eq!(normalize_load(2.0, 0), 2.0);
        assert_eq!(normalize_load(f64::NAN, 4), 0.0);
    }

    #[test]
    fn memory_percentage() {
        assert_eq!(memory_used_percent(16_000_000, 4_000_000), 75.0);
        assert_eq!(memory_used_percent(0, 0), 0.0);
        assert_eq!(memory_used_percent(100, 200), 0.0);
    }

    #[test]
    fn os_probe_never_reports_non_finite() {
        let g = OsProbe.sample();
        assert!(g.load1m_normalized.is_finite());
        assert!(g.memory_used_percent.is_finite());
    }
}
