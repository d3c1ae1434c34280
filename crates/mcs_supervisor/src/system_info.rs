//! Process-tree memory and host resource collectors (spec.md §4.8, §6).
//!
//! Linux-only via `/proc`; every query returns `None`/absent fields on other
//! targets rather than guessing (SPEC_FULL.md §C).

use mcs_protocol::SystemMemoryInfo;

/// Sum resident set size (RSS) over a process and every descendant found by
/// walking `/proc/*/stat` parent-pid links (SPEC_FULL.md §C).
#[cfg(target_os = "linux")]
pub fn process_tree_rss_mb(root_pid: u32) -> Option<f64> {
    let children = build_child_index();
    let mut stack = vec![root_pid];
    let mut seen = std::collections::HashSet::new();
    let mut total_kb: u64 = 0;

    while let Some(pid) = stack.pop() {
        if !seen.insert(pid) {
            continue;
        }
        if let Some(kb) = vm_rss_kb(pid) {
            total_kb += kb;
        }
        if let Some(kids) = children.get(&pid) {
            stack.extend(kids.iter().copied());
        }
    }

    if total_kb == 0 {
        None
    } else {
        Some(total_kb as f64 / 1024.0)
    }
}

#[cfg(not(target_os = "linux"))]
pub fn process_tree_rss_mb(_root_pid: u32) -> Option<f64> {
    None
}

#[cfg(target_os = "linux")]
fn vm_rss_kb(pid: u32) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            return rest.trim().split_whitespace().next()?.parse().ok();
        }
    }
    None
}

/// Build a parent-pid -> children index by scanning every `/proc/<pid>/stat`.
#[cfg(target_os = "linux")]
fn build_child_index() -> std::collections::HashMap<u32, Vec<u32>> {
    let mut children: std::collections::HashMap<u32, Vec<u32>> = std::collections::HashMap::new();
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return children;
    };
    for entry in entries.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };
        let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        // Fields are space separated after the ")" that closes the (comm) field,
        // which may itself contain spaces or parens.
        let Some(after_comm) = stat.rsplit_once(')').map(|(_, rest)| rest) else {
            continue;
        };
        let fields: Vec<&str> = after_comm.split_whitespace().collect();
        // state(0) ppid(1) ...
        if let Some(ppid_str) = fields.get(1) {
            if let Ok(ppid) = ppid_str.parse::<u32>() {
                children.entry(ppid).or_default().push(pid);
            }
        }
    }
    children
}

/// Host-wide memory totals from `/proc/meminfo` (Linux) or `None` elsewhere.
#[cfg(target_os = "linux")]
pub fn system_memory() -> SystemMemoryInfo {
    let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") else {
        return SystemMemoryInfo {
            total_mb: None,
            available_mb: None,
            used_mb: None,
        };
    };
    let total_kb = meminfo_field(&meminfo, "MemTotal:");
    let available_kb = meminfo_field(&meminfo, "MemAvailable:");
    let total_mb = total_kb.map(|kb| kb as f64 / 1024.0);
    let available_mb = available_kb.map(|kb| kb as f64 / 1024.0);
    let used_mb = match (total_kb, available_kb) {
        (Some(t), Some(a)) => Some((t.saturating_sub(a)) as f64 / 1024.0),
        _ => None,
    };
    SystemMemoryInfo {
        total_mb,
        available_mb,
        used_mb,
    }
}

#[cfg(not(target_os = "linux"))]
pub fn system_memory() -> SystemMemoryInfo {
    SystemMemoryInfo {
        total_mb: None,
        available_mb: None,
        used_mb: None,
    }
}

#[cfg(target_os = "linux")]
fn meminfo_field(meminfo: &str, key: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        line.strip_prefix(key)?
            .trim()
            .split_whitespace()
            .next()?
            .parse()
            .ok()
    })
}

/// Logical CPU count, via the number of `processor` entries in `/proc/cpuinfo`.
#[cfg(target_os = "linux")]
pub fn cpu_count() -> Option<usize> {
    let cpuinfo = std::fs::read_to_string("/proc/cpuinfo").ok()?;
    let count = cpuinfo
        .lines()
        .filter(|line| line.starts_with("processor"))
        .count();
    if count == 0 {
        None
    } else {
        Some(count)
    }
}

#[cfg(not(target_os = "linux"))]
pub fn cpu_count() -> Option<usize> {
    None
}

/// 1/5/15-minute load averages from `/proc/loadavg`.
#[cfg(target_os = "linux")]
pub fn load_average() -> Option<[f64; 3]> {
    let contents = std::fs::read_to_string("/proc/loadavg").ok()?;
    let mut parts = contents.split_whitespace();
    let one: f64 = parts.next()?.parse().ok()?;
    let five: f64 = parts.next()?.parse().ok()?;
    let fifteen: f64 = parts.next()?.parse().ok()?;
    Some([one, five, fifteen])
}

#[cfg(not(target_os = "linux"))]
pub fn load_average() -> Option<[f64; 3]> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_tree_rss_is_nonzero_on_linux() {
        #[cfg(target_os = "linux")]
        {
            let pid = std::process::id();
            assert!(process_tree_rss_mb(pid).unwrap_or(0.0) >= 0.0);
        }
    }

    #[test]
    fn system_memory_does_not_panic() {
        let _ = system_memory();
        let _ = cpu_count();
        let _ = load_average();
    }
}
