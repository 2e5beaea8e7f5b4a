use std::time::Instant;

// USER_HZ as exported to userspace through /proc.
const CLOCK_TICKS_PER_SEC: f64 = 100.0;

/// Reads process and host instrumentation. Every call yields the same gauge names; values
/// that cannot be read on this platform are reported as 0.
#[derive(Debug, Clone)]
pub struct ProcessSampler {
    started_at: Instant,
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSampler {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    pub fn sample(&self) -> Vec<(&'static str, f64)> {
        let status = read_proc("/proc/self/status")
            .map(|raw| parse_status(&raw))
            .unwrap_or_default();
        let stat = read_proc("/proc/self/stat")
            .and_then(|raw| parse_stat(&raw))
            .unwrap_or_default();
        let meminfo = read_proc("/proc/meminfo")
            .map(|raw| parse_meminfo(&raw))
            .unwrap_or_default();
        let load1 = read_proc("/proc/loadavg")
            .and_then(|raw| parse_loadavg(&raw))
            .unwrap_or(0.0);
        let parallelism = std::thread::available_parallelism()
            .map(|value| value.get())
            .unwrap_or(1) as f64;

        vec![
            ("ResidentMemory", status.resident_bytes as f64),
            ("PeakResidentMemory", status.peak_resident_bytes as f64),
            ("VirtualMemory", status.virtual_bytes as f64),
            ("DataSegment", status.data_bytes as f64),
            ("StackSegment", status.stack_bytes as f64),
            ("Threads", status.threads as f64),
            ("UserCPUTime", stat.user_ticks as f64 / CLOCK_TICKS_PER_SEC),
            ("SystemCPUTime", stat.system_ticks as f64 / CLOCK_TICKS_PER_SEC),
            ("MinorFaults", stat.minor_faults as f64),
            ("MajorFaults", stat.major_faults as f64),
            ("TotalMemory", meminfo.total_bytes as f64),
            ("FreeMemory", meminfo.free_bytes as f64),
            ("AvailableMemory", meminfo.available_bytes as f64),
            ("CPUutilization1", load1 / parallelism),
            ("Parallelism", parallelism),
            ("Uptime", self.started_at.elapsed().as_secs_f64()),
        ]
    }
}

#[derive(Debug, Default, PartialEq)]
struct StatusFields {
    resident_bytes: u64,
    peak_resident_bytes: u64,
    virtual_bytes: u64,
    data_bytes: u64,
    stack_bytes: u64,
    threads: u64,
}

#[derive(Debug, Default, PartialEq)]
struct StatFields {
    minor_faults: u64,
    major_faults: u64,
    user_ticks: u64,
    system_ticks: u64,
}

#[derive(Debug, Default, PartialEq)]
struct MemInfo {
    total_bytes: u64,
    free_bytes: u64,
    available_bytes: u64,
}

#[cfg(target_os = "linux")]
fn read_proc(path: &str) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

#[cfg(not(target_os = "linux"))]
fn read_proc(_path: &str) -> Option<String> {
    None
}

fn parse_status(raw: &str) -> StatusFields {
    let mut fields = StatusFields::default();
    for line in raw.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let slot = match key {
            "VmRSS" => &mut fields.resident_bytes,
            "VmHWM" => &mut fields.peak_resident_bytes,
            "VmSize" => &mut fields.virtual_bytes,
            "VmData" => &mut fields.data_bytes,
            "VmStk" => &mut fields.stack_bytes,
            "Threads" => {
                fields.threads = first_number(rest).unwrap_or(0);
                continue;
            }
            _ => continue,
        };
        *slot = kib_to_bytes(rest);
    }
    fields
}

fn parse_stat(raw: &str) -> Option<StatFields> {
    // The command name may contain spaces and parentheses; fields resume after the last ')'.
    let (_, rest) = raw.rsplit_once(')')?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let field = |n: usize| -> Option<u64> { fields.get(n - 3)?.parse().ok() };

    Some(StatFields {
        minor_faults: field(10)?,
        major_faults: field(12)?,
        user_ticks: field(14)?,
        system_ticks: field(15)?,
    })
}

fn parse_meminfo(raw: &str) -> MemInfo {
    let mut info = MemInfo::default();
    for line in raw.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        match key {
            "MemTotal" => info.total_bytes = kib_to_bytes(rest),
            "MemFree" => info.free_bytes = kib_to_bytes(rest),
            "MemAvailable" => info.available_bytes = kib_to_bytes(rest),
            _ => {}
        }
    }
    info
}

fn parse_loadavg(raw: &str) -> Option<f64> {
    raw.split_whitespace().next()?.parse().ok()
}

fn first_number(rest: &str) -> Option<u64> {
    rest.split_whitespace().next()?.parse().ok()
}

fn kib_to_bytes(rest: &str) -> u64 {
    first_number(rest)
        .and_then(|kib| kib.checked_mul(1024))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_fields_are_converted_to_bytes() {
        let raw = "Name:\tharvester-agent\nVmHWM:\t    2048 kB\nVmRSS:\t    1024 kB\nVmSize:\t   8192 kB\nVmData:\t     512 kB\nVmStk:\t     132 kB\nThreads:\t4\n";
        assert_eq!(
            parse_status(raw),
            StatusFields {
                resident_bytes: 1024 * 1024,
                peak_resident_bytes: 2048 * 1024,
                virtual_bytes: 8192 * 1024,
                data_bytes: 512 * 1024,
                stack_bytes: 132 * 1024,
                threads: 4,
            }
        );
    }

    #[test]
    fn stat_skips_command_with_spaces() {
        let raw = "4242 (tokio (worker) 1) S 1 4242 4242 0 -1 4194560 311 0 7 0 25 13 0 0 20 0 4 0 100 0 0";
        assert_eq!(
            parse_stat(raw),
            Some(StatFields {
                minor_faults: 311,
                major_faults: 7,
                user_ticks: 25,
                system_ticks: 13,
            })
        );
        assert_eq!(parse_stat("garbage"), None);
    }

    #[test]
    fn meminfo_and_loadavg() {
        let raw = "MemTotal:       16000000 kB\nMemFree:         4000000 kB\nMemAvailable:    9000000 kB\nBuffers:          100 kB\n";
        assert_eq!(
            parse_meminfo(raw),
            MemInfo {
                total_bytes: 16_000_000 * 1024,
                free_bytes: 4_000_000 * 1024,
                available_bytes: 9_000_000 * 1024,
            }
        );
        assert_eq!(parse_loadavg("0.52 0.40 0.33 1/234 5678\n"), Some(0.52));
    }

    #[test]
    fn sample_has_fixed_finite_gauge_set() {
        let sampler = ProcessSampler::new();
        let first: Vec<_> = sampler.sample().into_iter().map(|(name, _)| name).collect();
        let second = sampler.sample();

        assert_eq!(first.len(), 16);
        assert_eq!(
            first,
            second.iter().map(|(name, _)| *name).collect::<Vec<_>>()
        );
        assert!(second.iter().all(|(_, value)| value.is_finite()));
    }
}
