//! Error taxonomy for the sampling-and-decision loop.
//!
//! Per-cycle failures are non-fatal: the loop logs them, degrades the
//! affected signal, and proceeds to the next cycle. No variant here
//! ever terminates the process.

use std::path::PathBuf;

use crate::metric::MetricKind;

/// The policy file could not be read, parsed, or validated.
///
/// Fatal for the cycle that observed it (no sampling, no action), never
/// for the process. A file that exists but is corrupt is surfaced, not
/// silently replaced with defaults.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read policy file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("policy file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid policy: {0}")]
    Invalid(String),

    #[error("no configuration directory available on this host")]
    NoConfigDir,
}

/// One metric counter could not be sampled this cycle.
///
/// The evaluator degrades the metric according to the configured fail
/// mode; the other metrics are unaffected.
#[derive(Debug, thiserror::Error)]
#[error("{kind} counter unavailable: {reason}")]
pub struct SamplingError {
    pub kind: MetricKind,
    pub reason: String,
}

impl SamplingError {
    pub fn new(kind: MetricKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

/// The OS idle-input probe failed; idle time is unknown this cycle.
#[derive(Debug, thiserror::Error)]
#[error("idle probe failed: {0}")]
pub struct ProbeError(pub String);

/// An OS power-management call failed.
///
/// Logged and dropped by the loop; a failed suspend is not retried
/// mid-cycle, the situation is simply re-evaluated next cycle.
#[derive(Debug, thiserror::Error)]
#[error("power call `{call}` failed: {reason}")]
pub struct ActionError {
    pub call: &'static str,
    pub reason: String,
}

impl ActionError {
    pub fn new(call: &'static str, reason: impl Into<String>) -> Self {
        Self {
            call,
            reason: reason.into(),
        }
    }
}
