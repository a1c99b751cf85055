//! Metric and idle-time primitives shared across the workspace.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// The metric families the daemon samples each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Global processor utilization, percent.
    Cpu,
    /// Used physical memory, GiB.
    Ram,
    /// Aggregate network throughput across all interfaces, KiB/s.
    Bandwidth,
}

impl MetricKind {
    /// Evaluation order for a cycle.
    pub const ALL: [MetricKind; 3] = [MetricKind::Cpu, MetricKind::Ram, MetricKind::Bandwidth];

    /// Unit readings of this kind are expressed in.
    pub const fn unit(self) -> &'static str {
        match self {
            MetricKind::Cpu => "%",
            MetricKind::Ram => "GiB",
            MetricKind::Bandwidth => "KiB/s",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Ram => "ram",
            MetricKind::Bandwidth => "bandwidth",
        };
        f.write_str(name)
    }
}

/// A single normalized reading for one metric kind.
///
/// Produced fresh each cycle and dropped with it; readings are never
/// persisted or carried across cycles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricReading {
    pub kind: MetricKind,
    pub value: f64,
    pub unit: &'static str,
}

impl MetricReading {
    pub fn new(kind: MetricKind, value: f64) -> Self {
        Self {
            kind,
            value,
            unit: kind.unit(),
        }
    }
}

/// Time since the last user input, as observed at the top of a cycle.
///
/// An unknown idle duration (probe failure) skips the idle-triggered
/// suspend branch for that cycle only; everything else proceeds
/// normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleState {
    duration: Option<Duration>,
}

impl IdleState {
    pub fn known(duration: Duration) -> Self {
        Self {
            duration: Some(duration),
        }
    }

    pub fn unknown() -> Self {
        Self { duration: None }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn is_known(&self) -> bool {
        self.duration.is_some()
    }

    /// Whole seconds of idle time, if known. Used for the cycle report.
    pub fn as_secs(&self) -> Option<u64> {
        self.duration.map(|d| d.as_secs())
    }

    /// True when the idle duration is known and at least `threshold`.
    /// An unknown duration never satisfies any threshold.
    pub fn at_least(&self, threshold: Duration) -> bool {
        self.duration.is_some_and(|d| d >= threshold)
    }
}
