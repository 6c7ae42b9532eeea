//! Per-request resource accounting for the recommendation service.
//!
//! A [`RequestTracker`] snapshots wall time, process CPU time and resident
//! memory when a request starts and again when it finishes. CPU and memory
//! figures come from `/proc/self` and read as zero where procfs is missing.

use std::time::{Duration, Instant};
use serde::{Deserialize, Serialize};

/// Kernel clock ticks per second for `/proc` CPU times (USER_HZ)
const CLOCK_TICKS_PER_SECOND: f64 = 100.0;

/// Timing, CPU and memory figures captured for one served request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMetrics {
    pub elapsed_ms: u64,
    /// Ranked indices received from the coordinator
    pub candidates_received: usize,
    pub items_returned: usize,
    pub num_cpu: usize,
    /// Tasks alive on the async runtime when the request finished
    pub alive_tasks: usize,
    pub cpu_user_seconds: f64,
    pub cpu_system_seconds: f64,
    /// Process CPU time over wall time; may exceed 100 on several cores
    pub cpu_percent: f64,
    pub cpu_percent_per_cpu: f64,
    pub resident_bytes_start: u64,
    pub resident_bytes_end: u64,
}

/// Process resource counters at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessSnapshot {
    pub cpu_user_seconds: f64,
    pub cpu_system_seconds: f64,
    pub resident_bytes: u64,
}

impl ProcessSnapshot {
    pub fn capture() -> Self {
        let (cpu_user_seconds, cpu_system_seconds) = std::fs::read_to_string("/proc/self/stat")
            .ok()
            .and_then(|stat| parse_cpu_times(&stat))
            .unwrap_or_default();
        let resident_bytes = std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| parse_resident_bytes(&status))
            .unwrap_or(0);

        Self {
            cpu_user_seconds,
            cpu_system_seconds,
            resident_bytes,
        }
    }
}

/// User and system CPU seconds from a `/proc/<pid>/stat` line
fn parse_cpu_times(stat: &str) -> Option<(f64, f64)> {
    // The command name may contain spaces, so count fields after its closing paren
    let after_comm = stat.get(stat.rfind(')')? + 1..)?;
    let mut fields = after_comm.split_whitespace();
    // First field here is `state` (3); utime is 14 and stime 15
    let utime: f64 = fields.nth(11)?.parse().ok()?;
    let stime: f64 = fields.next()?.parse().ok()?;
    Some((utime / CLOCK_TICKS_PER_SECOND, stime / CLOCK_TICKS_PER_SECOND))
}

/// `VmRSS` from `/proc/<pid>/status`, in bytes
fn parse_resident_bytes(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib.saturating_mul(1024))
}

/// Measures one request from `start` to `finish`
pub struct RequestTracker {
    operation: String,
    start: Instant,
    process_start: ProcessSnapshot,
}

impl RequestTracker {
    pub fn start(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
            process_start: ProcessSnapshot::capture(),
        }
    }

    pub fn finish(self, candidates_received: usize, items_returned: usize) -> RequestMetrics {
        let elapsed = self.start.elapsed();
        let metrics = Self::build(
            elapsed,
            &self.process_start,
            &ProcessSnapshot::capture(),
            candidates_received,
            items_returned,
        );
        log::debug!(
            "{} completed in {:.3}ms ({:.1}% cpu)",
            self.operation,
            elapsed.as_secs_f64() * 1000.0,
            metrics.cpu_percent
        );
        metrics
    }

    fn build(
        elapsed: Duration,
        start: &ProcessSnapshot,
        end: &ProcessSnapshot,
        candidates_received: usize,
        items_returned: usize,
    ) -> RequestMetrics {
        let num_cpu = num_cpus::get().max(1);
        let cpu_user_seconds = (end.cpu_user_seconds - start.cpu_user_seconds).max(0.0);
        let cpu_system_seconds = (end.cpu_system_seconds - start.cpu_system_seconds).max(0.0);

        let elapsed_secs = elapsed.as_secs_f64();
        let cpu_percent = if elapsed_secs > 0.0 {
            (cpu_user_seconds + cpu_system_seconds) / elapsed_secs * 100.0
        } else {
            0.0
        };

        RequestMetrics {
            elapsed_ms: elapsed.as_millis() as u64,
            candidates_received,
            items_returned,
            num_cpu,
            alive_tasks: tokio::runtime::Handle::try_current()
                .map(|handle| handle.metrics().num_alive_tasks())
                .unwrap_or(0),
            cpu_user_seconds,
            cpu_system_seconds,
            cpu_percent,
            cpu_percent_per_cpu: cpu_percent / num_cpu as f64,
            resident_bytes_start: start.resident_bytes,
            resident_bytes_end: end.resident_bytes,
        }
    }
}
