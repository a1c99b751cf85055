//! Maps a cycle's decision onto the OS power-management surface.

use serde::Serialize;

use siesta_core::{Action, ActionError, Decision, IdleState, PolicyConfig};

use crate::power::PowerSurface;

/// What the controller actually did this cycle, for the cycle report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Applied {
    /// Stay-awake reasserted.
    StayAwake,
    /// Reverted to default idle behavior.
    Released,
    /// Reverted, and a suspend was issued.
    Suspended,
}

/// Executes decisions against a [`PowerSurface`].
pub struct SleepController<P: PowerSurface> {
    surface: P,
}

impl<P: PowerSurface> SleepController<P> {
    pub fn new(surface: P) -> Self {
        Self { surface }
    }

    /// Apply one cycle's decision.
    ///
    /// The stay-awake request is reissued on every inhibiting cycle:
    /// the OS primitive is level-triggered and reverts to default idle
    /// behavior if not continuously refreshed. On `Permit` the hold is
    /// released, and the machine is additionally suspended only when
    /// the user has been idle past the configured threshold.
    pub async fn apply(
        &mut self,
        decision: &Decision,
        idle: IdleState,
        config: &PolicyConfig,
    ) -> Result<Applied, ActionError> {
        match decision.action {
            Action::Inhibit => {
                self.surface.request_stay_awake(true, true).await?;
                Ok(Applied::StayAwake)
            }
            Action::Permit => {
                self.surface.release_stay_awake().await?;
                if decision.should_suspend(idle, config) {
                    tracing::info!(idle_secs = ?idle.as_secs(), "Idle threshold met, suspending");
                    self.surface.suspend_now().await?;
                    Ok(Applied::Suspended)
                } else {
                    Ok(Applied::Released)
                }
            }
        }
    }

    /// Final reversion on shutdown so the daemon never leaves the host
    /// pinned awake after exiting.
    pub async fn release(&mut self) -> Result<(), ActionError> {
        self.surface.release_stay_awake().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use siesta_core::MetricKind;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Request,
        Release,
        Suspend,
    }

    #[derive(Clone, Default)]
    struct RecordingSurface {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl RecordingSurface {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PowerSurface for RecordingSurface {
        async fn request_stay_awake(&mut self, _: bool, _: bool) -> Result<(), ActionError> {
            self.calls.lock().unwrap().push(Call::Request);
            Ok(())
        }

        async fn release_stay_awake(&mut self) -> Result<(), ActionError> {
            self.calls.lock().unwrap().push(Call::Release);
            Ok(())
        }

        async fn suspend_now(&mut self) -> Result<(), ActionError> {
            self.calls.lock().unwrap().push(Call::Suspend);
            Ok(())
        }
    }

    fn config_with_idle_mins(mins: u64) -> PolicyConfig {
        PolicyConfig {
            idle_threshold_mins: mins,
            ..PolicyConfig::default()
        }
    }

    fn inhibit() -> Decision {
        Decision {
            action: Action::Inhibit,
            reasons: vec![MetricKind::Cpu],
        }
    }

    fn permit() -> Decision {
        Decision {
            action: Action::Permit,
            reasons: vec![],
        }
    }

    #[tokio::test]
    async fn inhibit_requests_stay_awake() {
        let surface = RecordingSurface::default();
        let mut controller = SleepController::new(surface.clone());

        let applied = controller
            .apply(&inhibit(), IdleState::unknown(), &config_with_idle_mins(15))
            .await
            .unwrap();

        assert_eq!(applied, Applied::StayAwake);
        assert_eq!(surface.calls(), vec![Call::Request]);
    }

    #[tokio::test]
    async fn permit_below_idle_threshold_only_releases() {
        let surface = RecordingSurface::default();
        let mut controller = SleepController::new(surface.clone());

        let idle = IdleState::known(Duration::from_secs(60));
        let applied = controller
            .apply(&permit(), idle, &config_with_idle_mins(15))
            .await
            .unwrap();

        assert_eq!(applied, Applied::Released);
        assert_eq!(surface.calls(), vec![Call::Release]);
    }

    #[tokio::test]
    async fn permit_past_idle_threshold_suspends() {
        let surface = RecordingSurface::default();
        let mut controller = SleepController::new(surface.clone());

        let idle = IdleState::known(Duration::from_secs(25 * 60));
        let applied = controller
            .apply(&permit(), idle, &config_with_idle_mins(20))
            .await
            .unwrap();

        assert_eq!(applied, Applied::Suspended);
        assert_eq!(surface.calls(), vec![Call::Release, Call::Suspend]);
    }

    #[tokio::test]
    async fn unknown_idle_never_suspends() {
        let surface = RecordingSurface::default();
        let mut controller = SleepController::new(surface.clone());

        let applied = controller
            .apply(&permit(), IdleState::unknown(), &config_with_idle_mins(0))
            .await
            .unwrap();

        assert_eq!(applied, Applied::Released);
        assert_eq!(surface.calls(), vec![Call::Release]);
    }

    #[tokio::test]
    async fn release_reverts_the_surface() {
        let surface = RecordingSurface::default();
        let mut controller = SleepController::new(surface.clone());

        controller.release().await.unwrap();
        assert_eq!(surface.calls(), vec![Call::Release]);
    }
}
