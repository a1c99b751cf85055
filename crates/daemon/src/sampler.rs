//! Metric sources backed by `sysinfo`.
//!
//! Each source owns one long-lived sampling handle, opened once at
//! loop start and reused every cycle so rate-based counters can
//! compute deltas against the previous tick. The first sample after
//! opening is a priming read whose value is meaningless and must be
//! discarded by the caller; the monitor loop does this before its
//! first cycle.

use std::time::Instant;

use sysinfo::{Networks, System};

use siesta_core::{MetricKind, MetricReading, SamplingError};

const BYTES_PER_GIB: f64 = (1024u64 * 1024 * 1024) as f64;
const BYTES_PER_KIB: f64 = 1024.0;

/// Produces one normalized reading per cycle for a single metric kind.
pub trait MetricSource: Send {
    fn kind(&self) -> MetricKind;

    /// Read the counter. Fails with [`SamplingError`] when the
    /// underlying OS counter is unavailable; the evaluator degrades
    /// the metric for that cycle.
    fn sample(&mut self) -> Result<MetricReading, SamplingError>;
}

/// Global processor utilization, percent.
pub struct CpuSource {
    sys: System,
}

impl CpuSource {
    /// Open the processor sampling handle and take the baseline tick.
    pub fn open() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        Self { sys }
    }
}

impl MetricSource for CpuSource {
    fn kind(&self) -> MetricKind {
        MetricKind::Cpu
    }

    fn sample(&mut self) -> Result<MetricReading, SamplingError> {
        self.sys.refresh_cpu_usage();
        if self.sys.cpus().is_empty() {
            return Err(SamplingError::new(
                MetricKind::Cpu,
                "no processors reported",
            ));
        }
        Ok(MetricReading::new(
            MetricKind::Cpu,
            f64::from(self.sys.global_cpu_usage()),
        ))
    }
}

/// Used physical memory, GiB.
pub struct RamSource {
    sys: System,
}

impl RamSource {
    pub fn open() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        Self { sys }
    }
}

impl MetricSource for RamSource {
    fn kind(&self) -> MetricKind {
        MetricKind::Ram
    }

    fn sample(&mut self) -> Result<MetricReading, SamplingError> {
        self.sys.refresh_memory();
        if self.sys.total_memory() == 0 {
            return Err(SamplingError::new(
                MetricKind::Ram,
                "memory counters unavailable",
            ));
        }
        Ok(MetricReading::new(
            MetricKind::Ram,
            self.sys.used_memory() as f64 / BYTES_PER_GIB,
        ))
    }
}

/// Aggregate network throughput across all interfaces, KiB/s.
///
/// Byte counters are cumulative, so the rate is the delta against the
/// previous tick divided by elapsed wall time. A host with no network
/// interfaces reads zero rather than failing the cycle -- bandwidth is
/// an optional signal.
pub struct BandwidthSource {
    networks: Networks,
    prev_total_bytes: u64,
    last_tick: Instant,
}

impl BandwidthSource {
    pub fn open() -> Self {
        let networks = Networks::new_with_refreshed_list();
        let prev_total_bytes = total_bytes(&networks);
        Self {
            networks,
            prev_total_bytes,
            last_tick: Instant::now(),
        }
    }
}

impl MetricSource for BandwidthSource {
    fn kind(&self) -> MetricKind {
        MetricKind::Bandwidth
    }

    fn sample(&mut self) -> Result<MetricReading, SamplingError> {
        self.networks.refresh(true);

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick).as_secs_f64();
        let total = total_bytes(&self.networks);

        let rate = if self.networks.list().is_empty() {
            0.0
        } else {
            rate_kib_per_sec(self.prev_total_bytes, total, elapsed)
        };

        self.prev_total_bytes = total;
        self.last_tick = now;
        Ok(MetricReading::new(MetricKind::Bandwidth, rate))
    }
}

fn total_bytes(networks: &Networks) -> u64 {
    networks
        .list()
        .values()
        .map(|data| data.total_received() + data.total_transmitted())
        .sum()
}

/// KiB/s from a cumulative byte-counter delta over elapsed wall time.
///
/// Counters can go backwards when an interface departs or resets; the
/// saturating delta reads zero for that tick instead of underflowing.
/// Elapsed time is clamped so a double-poll cannot divide by zero.
fn rate_kib_per_sec(prev_total: u64, total: u64, elapsed_secs: f64) -> f64 {
    total.saturating_sub(prev_total) as f64 / elapsed_secs.max(0.1) / BYTES_PER_KIB
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_is_delta_over_elapsed_time() {
        // 2048 KiB over 2 seconds = 1024 KiB/s.
        let rate = rate_kib_per_sec(0, 2048 * 1024, 2.0);
        assert!((rate - 1024.0).abs() < 1e-9);
    }

    #[test]
    fn counter_reset_reads_zero_not_underflow() {
        assert_eq!(rate_kib_per_sec(1_000_000, 500, 1.0), 500.0 / 1024.0);
        assert_eq!(rate_kib_per_sec(1_000_000, 0, 1.0), 0.0);
    }

    #[test]
    fn tiny_elapsed_time_is_clamped() {
        let rate = rate_kib_per_sec(0, 1024, 0.0);
        assert!(rate.is_finite());
        // Clamped to 0.1s: 1 KiB / 0.1 s = 10 KiB/s.
        assert!((rate - 10.0).abs() < 1e-9);
    }

    #[test]
    fn cpu_source_reports_a_percentage() {
        let mut source = CpuSource::open();
        // Priming read, then the real one after the minimum interval
        // sysinfo needs between CPU refreshes.
        let _ = source.sample();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        let reading = source.sample().expect("host should report processors");
        assert_eq!(reading.kind, MetricKind::Cpu);
        assert_eq!(reading.unit, "%");
        assert!((0.0..=100.0).contains(&reading.value));
    }

    #[test]
    fn ram_source_reports_used_gib() {
        let mut source = RamSource::open();
        let _ = source.sample();
        let reading = source.sample().expect("host should report memory");
        assert_eq!(reading.kind, MetricKind::Ram);
        assert!(reading.value > 0.0, "a running host uses some memory");
    }

    #[test]
    fn bandwidth_source_never_fails_the_cycle() {
        let mut source = BandwidthSource::open();
        let _ = source.sample();
        let reading = source.sample().expect("bandwidth degrades, never errors");
        assert_eq!(reading.kind, MetricKind::Bandwidth);
        assert!(reading.value.is_finite());
        assert!(reading.value >= 0.0);
    }
}
