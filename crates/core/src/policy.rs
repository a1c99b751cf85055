//! Threshold policy evaluation.
//!
//! [`PolicyEvaluator::evaluate`] folds one cycle's metric readings and
//! the active [`PolicyConfig`] into a single [`Decision`]. Evaluation
//! is pure: identical inputs always produce an identical decision, and
//! nothing is carried between cycles.

use serde::Serialize;

use crate::config::{FailMode, PolicyConfig};
use crate::metric::{IdleState, MetricKind, MetricReading};

/// What the host should be told to do this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// At least one enabled metric is above its threshold; keep the
    /// system and display awake.
    Inhibit,
    /// Nothing is busy; stop holding the system awake.
    Permit,
}

/// Outcome of one evaluation cycle.
///
/// `reasons` lists every metric that triggered inhibition, not just the
/// first, so the cycle log shows the full picture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub action: Action,
    pub reasons: Vec<MetricKind>,
}

impl Decision {
    /// Whether this cycle should actively suspend the machine.
    ///
    /// `Permit` only means "stop holding the OS awake"; forcing sleep
    /// additionally requires the user to have been idle for at least
    /// the configured threshold. An unknown idle duration never
    /// suspends.
    pub fn should_suspend(&self, idle: IdleState, config: &PolicyConfig) -> bool {
        self.action == Action::Permit && idle.at_least(config.idle_threshold())
    }
}

/// Stateless threshold evaluator.
pub struct PolicyEvaluator;

impl PolicyEvaluator {
    /// Compare each enabled metric's reading against its threshold.
    ///
    /// A metric counts as busy only when its reading is strictly
    /// greater than the threshold; a reading exactly at the threshold
    /// does not inhibit. Disabled metrics never influence the outcome.
    /// A metric with no reading this cycle (sampling failure upstream)
    /// is degraded according to `config.on_sampling_error`.
    pub fn evaluate(config: &PolicyConfig, readings: &[MetricReading]) -> Decision {
        let mut reasons = Vec::new();

        for kind in MetricKind::ALL {
            let policy = config.policy_for(kind);
            if !policy.enabled {
                continue;
            }

            match readings.iter().find(|r| r.kind == kind) {
                Some(reading) => {
                    if reading.value > policy.threshold {
                        reasons.push(kind);
                    }
                }
                None => match config.on_sampling_error {
                    FailMode::FailOpen => {
                        tracing::debug!(metric = %kind, "No reading this cycle, treated as not exceeded");
                    }
                    FailMode::FailClosed => {
                        tracing::warn!(metric = %kind, "No reading this cycle, treated as exceeded (fail_closed)");
                        reasons.push(kind);
                    }
                },
            }
        }

        let action = if reasons.is_empty() {
            Action::Permit
        } else {
            Action::Inhibit
        };

        Decision { action, reasons }
    }
}
