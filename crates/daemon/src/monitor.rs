//! The sampling-and-decision loop.
//!
//! One sequential task drives the whole daemon: reload the policy,
//! sample metrics and idle time, evaluate, act, report, then wait out
//! the configured interval. Cycles never overlap, and the inter-cycle
//! wait is interruptible so cancellation is observed promptly -- but
//! only at cycle boundaries, never mid-cycle, so the OS is not left in
//! an inhibited state.
//!
//! Per-cycle errors are logged and degraded, never fatal: a corrupt
//! policy file skips the cycle, a failed counter degrades one metric,
//! a failed idle probe skips the suspend branch, and a failed power
//! call is simply re-evaluated next cycle.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use siesta_core::{
    Action, ConfigProvider, Decision, IdleState, MetricKind, MetricReading, PolicyEvaluator,
};

use crate::controller::{Applied, SleepController};
use crate::idle::IdleProbe;
use crate::power::PowerSurface;
use crate::sampler::MetricSource;

/// Wait used until the first successful policy load establishes the
/// configured interval.
const DEFAULT_WAIT: Duration = Duration::from_secs(10);

/// One structured status line per cycle.
#[derive(Debug, Serialize)]
pub struct CycleReport {
    pub observed_at: String,
    pub idle_secs: Option<u64>,
    pub cpu_percent: Option<f64>,
    pub ram_used_gib: Option<f64>,
    pub bandwidth_kib_s: Option<f64>,
    pub action: Action,
    pub reasons: Vec<MetricKind>,
    /// `None` when the power call for this cycle failed.
    pub applied: Option<Applied>,
}

impl CycleReport {
    fn emit(&self) {
        tracing::info!(
            observed_at = %self.observed_at,
            idle_secs = ?self.idle_secs,
            cpu_percent = ?self.cpu_percent,
            ram_used_gib = ?self.ram_used_gib,
            bandwidth_kib_s = ?self.bandwidth_kib_s,
            action = ?self.action,
            reasons = ?self.reasons,
            applied = ?self.applied,
            "Cycle complete",
        );
    }
}

/// Owns the long-lived sampling handles, the idle probe, the sleep
/// controller, and the config provider for the lifetime of the loop.
///
/// Everything per-cycle (config snapshot, readings, idle state,
/// decision) is constructed fresh and dropped with the cycle; the only
/// cross-cycle state lives inside the sampling handles, which need a
/// previous-tick baseline to compute rates.
pub struct MonitorLoop<C, I, P>
where
    C: ConfigProvider + Send,
    I: IdleProbe,
    P: PowerSurface,
{
    provider: C,
    sources: Vec<Box<dyn MetricSource>>,
    probe: I,
    controller: SleepController<P>,
    /// Last interval a successful policy load asked for; reused as the
    /// wait when a reload fails.
    wait: Duration,
}

impl<C, I, P> MonitorLoop<C, I, P>
where
    C: ConfigProvider + Send,
    I: IdleProbe,
    P: PowerSurface,
{
    pub fn new(provider: C, sources: Vec<Box<dyn MetricSource>>, probe: I, surface: P) -> Self {
        Self {
            provider,
            sources,
            probe,
            controller: SleepController::new(surface),
            wait: DEFAULT_WAIT,
        }
    }

    /// Run until `cancel` fires.
    ///
    /// The first cycle starts immediately. Cancellation is observed
    /// only between cycles -- a cycle that has started always finishes
    /// its acting step -- and the surface is reverted once more on the
    /// way out so the host is never left pinned awake by a dead daemon.
    pub async fn run(mut self, cancel: CancellationToken) {
        self.prime();

        loop {
            self.cycle().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.wait) => {}
            }
        }

        tracing::info!("Monitor loop stopping");
        if let Err(e) = self.controller.release().await {
            tracing::warn!(error = %e, "Final stay-awake release failed");
        }
    }

    /// Discard the first reading of every sampling handle. Rate-based
    /// counters report meaningless values until a baseline tick has
    /// elapsed.
    fn prime(&mut self) {
        for source in &mut self.sources {
            match source.sample() {
                Ok(_) => tracing::debug!(metric = %source.kind(), "Priming sample discarded"),
                Err(e) => {
                    tracing::debug!(metric = %source.kind(), error = %e, "Priming sample failed")
                }
            }
        }
    }

    /// One reload → sample → evaluate → act → report pass.
    async fn cycle(&mut self) {
        let config = match self.provider.load() {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "Policy reload failed, skipping this cycle");
                return;
            }
        };
        self.wait = config.check_interval();

        let idle = match self.probe.idle_duration().await {
            Ok(duration) => IdleState::known(duration),
            Err(e) => {
                tracing::warn!(error = %e, "Idle probe failed, idle-triggered sleep skipped this cycle");
                IdleState::unknown()
            }
        };

        let mut readings = Vec::with_capacity(self.sources.len());
        for source in &mut self.sources {
            match source.sample() {
                Ok(reading) => readings.push(reading),
                Err(e) => {
                    tracing::warn!(metric = %source.kind(), error = %e, "Sampling failed, metric degraded this cycle");
                }
            }
        }

        let decision = PolicyEvaluator::evaluate(&config, &readings);

        let applied = match self.controller.apply(&decision, idle, &config).await {
            Ok(applied) => Some(applied),
            Err(e) => {
                tracing::error!(error = %e, "Power action failed");
                None
            }
        };

        report(&readings, idle, &decision, applied);
    }
}

fn report(
    readings: &[MetricReading],
    idle: IdleState,
    decision: &Decision,
    applied: Option<Applied>,
) {
    let value_of = |kind: MetricKind| readings.iter().find(|r| r.kind == kind).map(|r| r.value);

    CycleReport {
        observed_at: Utc::now().to_rfc3339(),
        idle_secs: idle.as_secs(),
        cpu_percent: value_of(MetricKind::Cpu),
        ram_used_gib: value_of(MetricKind::Ram),
        bandwidth_kib_s: value_of(MetricKind::Bandwidth),
        action: decision.action,
        reasons: decision.reasons.clone(),
        applied,
    }
    .emit();
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The report serializes with every expected field, including
    /// `None` → `null` for signals missing that cycle.
    #[test]
    fn cycle_report_serialization_includes_all_fields() {
        let report = CycleReport {
            observed_at: "2026-08-06T12:00:00+00:00".to_string(),
            idle_secs: Some(1500),
            cpu_percent: Some(12.5),
            ram_used_gib: Some(2.1),
            bandwidth_kib_s: None,
            action: Action::Permit,
            reasons: vec![],
            applied: Some(Applied::Suspended),
        };

        let json = serde_json::to_value(&report).expect("report should serialize");
        assert_eq!(json["idle_secs"], 1500);
        assert_eq!(json["cpu_percent"], 12.5);
        assert!(json["bandwidth_kib_s"].is_null());
        assert_eq!(json["action"], "permit");
        assert_eq!(json["applied"], "suspended");
    }

    #[test]
    fn inhibit_report_carries_reasons() {
        let report = CycleReport {
            observed_at: "2026-08-06T12:00:00+00:00".to_string(),
            idle_secs: None,
            cpu_percent: Some(90.0),
            ram_used_gib: Some(3.5),
            bandwidth_kib_s: Some(800.0),
            action: Action::Inhibit,
            reasons: vec![MetricKind::Cpu, MetricKind::Ram],
            applied: Some(Applied::StayAwake),
        };

        let json = serde_json::to_value(&report).expect("report should serialize");
        assert_eq!(json["action"], "inhibit");
        assert_eq!(json["reasons"][0], "cpu");
        assert_eq!(json["reasons"][1], "ram");
        assert!(json["idle_secs"].is_null());
    }
}
