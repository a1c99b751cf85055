//! The OS power-management surface.
//!
//! [`PowerSurface`] is the narrow collaborator the sleep controller
//! drives: a stay-awake request, its release, and a suspend call. The
//! stay-awake primitive is level-triggered on every supported OS --
//! it reverts to default idle behavior unless refreshed -- so the
//! request must tolerate being reissued every cycle.
//!
//! Platform support:
//! - Windows: `SetThreadExecutionState` + `SetSuspendState`
//! - macOS: a held `caffeinate` child + `pmset sleepnow`
//! - Linux: a held `systemd-inhibit` child + `systemctl suspend`

use async_trait::async_trait;

use siesta_core::ActionError;

pub use imp::SystemPowerSurface;

/// OS power-management calls, as seen by the sleep controller.
#[async_trait]
pub trait PowerSurface: Send {
    /// Ask the power manager to keep the system (and optionally the
    /// display) active. Safe and cheap to reissue every cycle.
    async fn request_stay_awake(&mut self, system: bool, display: bool)
        -> Result<(), ActionError>;

    /// Revert to default idle behavior.
    async fn release_stay_awake(&mut self) -> Result<(), ActionError>;

    /// Suspend the machine now. Fire-and-forget: the calling process
    /// may itself be suspended before this returns, so callers must
    /// not assume a prompt return.
    async fn suspend_now(&mut self) -> Result<(), ActionError>;
}

// ─── Windows ────────────────────────────────────────────────────────────────

#[cfg(target_os = "windows")]
mod imp {
    use async_trait::async_trait;

    use siesta_core::ActionError;

    use super::PowerSurface;

    const ES_CONTINUOUS: u32 = 0x8000_0000;
    const ES_SYSTEM_REQUIRED: u32 = 0x0000_0001;
    const ES_DISPLAY_REQUIRED: u32 = 0x0000_0002;

    #[link(name = "kernel32")]
    extern "system" {
        fn SetThreadExecutionState(es_flags: u32) -> u32;
    }

    #[link(name = "powrprof")]
    extern "system" {
        fn SetSuspendState(hibernate: u8, force_critical: u8, disable_wake_event: u8) -> u8;
    }

    /// Execution-state surface. `ES_CONTINUOUS` requests time out if
    /// the flag is not reasserted, hence the per-cycle reissue.
    #[derive(Default)]
    pub struct SystemPowerSurface;

    impl SystemPowerSurface {
        pub fn new() -> Self {
            Self
        }
    }

    #[async_trait]
    impl PowerSurface for SystemPowerSurface {
        async fn request_stay_awake(
            &mut self,
            system: bool,
            display: bool,
        ) -> Result<(), ActionError> {
            let mut flags = ES_CONTINUOUS;
            if system {
                flags |= ES_SYSTEM_REQUIRED;
            }
            if display {
                flags |= ES_DISPLAY_REQUIRED;
            }

            if unsafe { SetThreadExecutionState(flags) } == 0 {
                return Err(ActionError::new(
                    "SetThreadExecutionState",
                    "call returned 0",
                ));
            }
            Ok(())
        }

        async fn release_stay_awake(&mut self) -> Result<(), ActionError> {
            if unsafe { SetThreadExecutionState(ES_CONTINUOUS) } == 0 {
                return Err(ActionError::new(
                    "SetThreadExecutionState",
                    "call returned 0",
                ));
            }
            Ok(())
        }

        async fn suspend_now(&mut self) -> Result<(), ActionError> {
            if unsafe { SetSuspendState(0, 0, 0) } == 0 {
                return Err(ActionError::new("SetSuspendState", "call returned 0"));
            }
            Ok(())
        }
    }
}

// ─── macOS ──────────────────────────────────────────────────────────────────

#[cfg(target_os = "macos")]
mod imp {
    use std::process::Stdio;

    use async_trait::async_trait;
    use tokio::process::{Child, Command};

    use siesta_core::ActionError;

    use super::PowerSurface;

    /// A held `caffeinate` child asserts the stay-awake state; killing
    /// it (or the daemon exiting, via `kill_on_drop`) releases it.
    #[derive(Default)]
    pub struct SystemPowerSurface {
        inhibitor: Option<Child>,
    }

    impl SystemPowerSurface {
        pub fn new() -> Self {
            Self { inhibitor: None }
        }

        fn inhibitor_alive(&mut self) -> bool {
            match self.inhibitor.as_mut() {
                Some(child) => matches!(child.try_wait(), Ok(None)),
                None => false,
            }
        }
    }

    #[async_trait]
    impl PowerSurface for SystemPowerSurface {
        async fn request_stay_awake(
            &mut self,
            system: bool,
            display: bool,
        ) -> Result<(), ActionError> {
            if self.inhibitor_alive() {
                // The held child is the asserted state.
                return Ok(());
            }

            let mut flags = String::from("-");
            if system {
                flags.push_str("is");
            }
            if display {
                flags.push('d');
            }
            if flags == "-" {
                return Ok(());
            }

            let child = Command::new("caffeinate")
                .arg(&flags)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| ActionError::new("caffeinate", e.to_string()))?;
            self.inhibitor = Some(child);
            Ok(())
        }

        async fn release_stay_awake(&mut self) -> Result<(), ActionError> {
            if let Some(mut child) = self.inhibitor.take() {
                if matches!(child.try_wait(), Ok(None)) {
                    child.start_kill().map_err(|e| {
                        ActionError::new("caffeinate", format!("failed to stop inhibitor: {e}"))
                    })?;
                }
            }
            Ok(())
        }

        async fn suspend_now(&mut self) -> Result<(), ActionError> {
            Command::new("pmset")
                .arg("sleepnow")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map(|_| ())
                .map_err(|e| ActionError::new("pmset sleepnow", e.to_string()))
        }
    }
}

// ─── Linux ──────────────────────────────────────────────────────────────────

#[cfg(target_os = "linux")]
mod imp {
    use std::process::Stdio;

    use async_trait::async_trait;
    use tokio::process::{Child, Command};

    use siesta_core::ActionError;

    use super::PowerSurface;

    /// A held `systemd-inhibit` child blocks sleep and the idle action
    /// while inhibiting; killing it (or the daemon exiting, via
    /// `kill_on_drop`) releases the lock.
    #[derive(Default)]
    pub struct SystemPowerSurface {
        inhibitor: Option<Child>,
    }

    impl SystemPowerSurface {
        pub fn new() -> Self {
            Self { inhibitor: None }
        }

        fn inhibitor_alive(&mut self) -> bool {
            match self.inhibitor.as_mut() {
                Some(child) => matches!(child.try_wait(), Ok(None)),
                None => false,
            }
        }
    }

    #[async_trait]
    impl PowerSurface for SystemPowerSurface {
        async fn request_stay_awake(
            &mut self,
            system: bool,
            display: bool,
        ) -> Result<(), ActionError> {
            if self.inhibitor_alive() {
                // The held lock is the asserted state.
                return Ok(());
            }

            let mut what = Vec::new();
            if system {
                what.push("sleep");
            }
            if display {
                what.push("idle");
            }
            if what.is_empty() {
                return Ok(());
            }

            let child = Command::new("systemd-inhibit")
                .args([
                    "--what",
                    &what.join(":"),
                    "--who",
                    "siesta",
                    "--why",
                    "resource activity above policy thresholds",
                    "--mode",
                    "block",
                    "sleep",
                    "infinity",
                ])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| ActionError::new("systemd-inhibit", e.to_string()))?;
            self.inhibitor = Some(child);
            Ok(())
        }

        async fn release_stay_awake(&mut self) -> Result<(), ActionError> {
            if let Some(mut child) = self.inhibitor.take() {
                if matches!(child.try_wait(), Ok(None)) {
                    child.start_kill().map_err(|e| {
                        ActionError::new(
                            "systemd-inhibit",
                            format!("failed to stop inhibitor: {e}"),
                        )
                    })?;
                }
            }
            Ok(())
        }

        async fn suspend_now(&mut self) -> Result<(), ActionError> {
            // Spawn without waiting: the process may be suspended
            // before systemctl reports back.
            Command::new("systemctl")
                .arg("suspend")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map(|_| ())
                .map_err(|e| ActionError::new("systemctl suspend", e.to_string()))
        }
    }
}

// ─── Other platforms ────────────────────────────────────────────────────────

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
mod imp {
    use async_trait::async_trait;

    use siesta_core::ActionError;

    use super::PowerSurface;

    #[derive(Default)]
    pub struct SystemPowerSurface;

    impl SystemPowerSurface {
        pub fn new() -> Self {
            Self
        }
    }

    #[async_trait]
    impl PowerSurface for SystemPowerSurface {
        async fn request_stay_awake(&mut self, _: bool, _: bool) -> Result<(), ActionError> {
            Err(ActionError::new("request_stay_awake", "unsupported platform"))
        }

        async fn release_stay_awake(&mut self) -> Result<(), ActionError> {
            Err(ActionError::new("release_stay_awake", "unsupported platform"))
        }

        async fn suspend_now(&mut self) -> Result<(), ActionError> {
            Err(ActionError::new("suspend_now", "unsupported platform"))
        }
    }
}
