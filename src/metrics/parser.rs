//! Parsers for diagnostic command output.
//!
//! Each parser turns the raw text of one diagnostic command into the
//! display string for its metric. Malformed output never fails: it is
//! replaced with a fixed placeholder describing what is missing.

use once_cell::sync::Lazy;
use regex::Regex;

/// Placeholder when `free` output cannot be parsed
pub const MEMORY_UNAVAILABLE: &str = "Memory info not available";

/// Placeholder when `df` output cannot be parsed
pub const DISK_UNAVAILABLE: &str = "Disk usage info not available";

/// Placeholder when `top` output has no idle figure
pub const CPU_UNAVAILABLE: &str = "CPU usage info not available";

static CPU_IDLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+\.\d+) id").expect("valid regex"));

/// `uptime` output, trimmed.
pub fn parse_uptime(output: &str) -> String {
    output.trim().to_string()
}

/// `free` output as `"{used}GB/{total}GB ({pct}%)"`.
///
/// Reads the second line. A leading `Mem:`-style label is skipped, the next
/// two fields are total and used.
pub fn parse_memory(output: &str) -> String {
    let Some(line) = output.lines().nth(1) else {
        return MEMORY_UNAVAILABLE.to_string();
    };

    let mut fields = line.split_whitespace().peekable();
    if fields.peek().is_some_and(|f| f.ends_with(':')) {
        fields.next();
    }

    let total = fields.next().and_then(|f| f.parse::<f64>().ok());
    let used = fields.next().and_then(|f| f.parse::<f64>().ok());

    match (total, used) {
        (Some(total), Some(used)) if total > 0.0 => {
            let pct = used / total * 100.0;
            format!(
                "{:.2}GB/{:.2}GB ({:.2}%)",
                used / 1024.0,
                total / 1024.0,
                pct
            )
        }
        _ => MEMORY_UNAVAILABLE.to_string(),
    }
}

/// `df` output as `"Used: {used}, Total: {size}, Available: {avail} ({pct}%)"`.
///
/// Reads fields 2-5 of the second line verbatim; the percent field keeps
/// its own `%` sign.
pub fn parse_disk(output: &str) -> String {
    let Some(line) = output.lines().nth(1) else {
        return DISK_UNAVAILABLE.to_string();
    };

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 5 {
        return DISK_UNAVAILABLE.to_string();
    }

    let (size, used, available, used_pct) = (fields[1], fields[2], fields[3], fields[4]);
    format!(
        "Used: {}, Total: {}, Available: {} ({}%)",
        used, size, available, used_pct
    )
}

/// `top` output as `"{100 - idle}%"`.
pub fn parse_cpu(output: &str) -> String {
    let idle = CPU_IDLE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());

    match idle {
        Some(idle) => format!("{:.2}%", 100.0 - idle),
        None => CPU_UNAVAILABLE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_uptime_trims() {
        assert_eq!(
            parse_uptime("  10:01:02 up 3 days,  2 users\n"),
            "10:01:02 up 3 days,  2 users"
        );
    }

    #[test]
    fn test_memory_unlabelled_second_line() {
        assert_eq!(
            parse_memory("Mem: x y\n  7822  3421  4401 ...\n"),
            "3.34GB/7.64GB (43.74%)"
        );
    }

    #[test]
    fn test_memory_free_m_output() {
        let output = "               total        used        free      shared  buff/cache   available\n\
                      Mem:            7822        3421        1120         210        3280        3900\n\
                      Swap:           2047           0        2047\n";
        assert_eq!(parse_memory(output), "3.34GB/7.64GB (43.74%)");
    }

    #[test]
    fn test_memory_single_line() {
        assert_eq!(parse_memory("Mem: x y\n"), MEMORY_UNAVAILABLE);
        assert_eq!(parse_memory(""), MEMORY_UNAVAILABLE);
    }

    #[test]
    fn test_memory_garbage_fields() {
        assert_eq!(parse_memory("header\nMem: lots some\n"), MEMORY_UNAVAILABLE);
        assert_eq!(parse_memory("header\nMem: 0 0\n"), MEMORY_UNAVAILABLE);
        assert_eq!(parse_memory("header\nMem: 100\n"), MEMORY_UNAVAILABLE);
    }

    #[test]
    fn test_disk() {
        let output = "Filesystem      Size  Used Avail Use% Mounted on\n/dev/sda1 50G 20G 28G 42% /\n";
        assert_eq!(
            parse_disk(output),
            "Used: 20G, Total: 50G, Available: 28G (42%%)"
        );
    }

    #[test]
    fn test_disk_unavailable() {
        assert_eq!(parse_disk("Filesystem Size Used\n"), DISK_UNAVAILABLE);
        assert_eq!(parse_disk("Filesystem\n/dev/sda1 50G\n"), DISK_UNAVAILABLE);
    }

    #[test]
    fn test_cpu() {
        let output = "%Cpu(s):  5.9 us,  2.0 sy,  0.0 ni, 12.50 id,  0.0 wa,  0.0 hi\n";
        assert_eq!(parse_cpu(output), "87.50%");
    }

    #[test]
    fn test_cpu_first_match_wins() {
        assert_eq!(parse_cpu("90.00 id\n10.00 id\n"), "10.00%");
    }

    #[test]
    fn test_cpu_unavailable() {
        assert_eq!(parse_cpu("%Cpu(s): 5 us, 95 id"), CPU_UNAVAILABLE);
        assert_eq!(parse_cpu(""), CPU_UNAVAILABLE);
    }
}
