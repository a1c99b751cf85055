//! Elapsed time since the last user input event.
//!
//! The probe asks the OS input-event subsystem when the user last
//! touched keyboard or mouse. Failure is expected in some environments
//! (headless session, missing tooling, no permission) and yields a
//! [`ProbeError`]; the monitor loop then treats idle time as unknown
//! and skips the idle-triggered suspend branch for that cycle only.

use std::time::Duration;

use async_trait::async_trait;

use siesta_core::ProbeError;

/// Reports how long the user has been idle.
#[async_trait]
pub trait IdleProbe: Send {
    async fn idle_duration(&mut self) -> Result<Duration, ProbeError>;
}

/// Platform probe over the OS input-event subsystem.
#[derive(Default)]
pub struct SystemIdleProbe;

impl SystemIdleProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl IdleProbe for SystemIdleProbe {
    async fn idle_duration(&mut self) -> Result<Duration, ProbeError> {
        imp::idle_duration().await
    }
}

// ─── Windows ────────────────────────────────────────────────────────────────

#[cfg(target_os = "windows")]
mod imp {
    use std::time::Duration;

    use siesta_core::ProbeError;

    #[repr(C)]
    struct LASTINPUTINFO {
        cb_size: u32,
        dw_time: u32,
    }

    #[link(name = "user32")]
    extern "system" {
        fn GetLastInputInfo(plii: *mut LASTINPUTINFO) -> i32;
    }

    #[link(name = "kernel32")]
    extern "system" {
        fn GetTickCount() -> u32;
    }

    pub(super) async fn idle_duration() -> Result<Duration, ProbeError> {
        let mut info = LASTINPUTINFO {
            cb_size: std::mem::size_of::<LASTINPUTINFO>() as u32,
            dw_time: 0,
        };

        let ok = unsafe { GetLastInputInfo(&mut info) };
        if ok == 0 {
            return Err(ProbeError("GetLastInputInfo failed".to_string()));
        }

        // The tick counter wraps every ~49.7 days; the wrapping
        // subtraction keeps the delta correct across the wrap.
        let idle_ms = unsafe { GetTickCount() }.wrapping_sub(info.dw_time);
        Ok(Duration::from_millis(u64::from(idle_ms)))
    }
}

// ─── macOS ──────────────────────────────────────────────────────────────────

#[cfg(target_os = "macos")]
mod imp {
    use std::time::Duration;

    use siesta_core::ProbeError;

    /// `ioreg -c IOHIDSystem` exposes `HIDIdleTime` in nanoseconds.
    pub(super) async fn idle_duration() -> Result<Duration, ProbeError> {
        let output = tokio::process::Command::new("ioreg")
            .args(["-c", "IOHIDSystem", "-d", "4"])
            .output()
            .await
            .map_err(|e| ProbeError(format!("failed to run ioreg: {e}")))?;

        if !output.status.success() {
            return Err(ProbeError(format!("ioreg exited with {}", output.status)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let nanos = parse_hid_idle_ns(&stdout)
            .ok_or_else(|| ProbeError("HIDIdleTime not present in ioreg output".to_string()))?;
        Ok(Duration::from_nanos(nanos))
    }

    /// Pull the first `"HIDIdleTime" = <nanos>` value out of ioreg
    /// output.
    fn parse_hid_idle_ns(output: &str) -> Option<u64> {
        for line in output.lines() {
            if let Some(idx) = line.find("\"HIDIdleTime\"") {
                let rest = line[idx..].split('=').nth(1)?;
                return rest.trim().parse().ok();
            }
        }
        None
    }

}

// ─── Linux ──────────────────────────────────────────────────────────────────

#[cfg(target_os = "linux")]
mod imp {
    use std::time::Duration;

    use siesta_core::ProbeError;

    /// X11 sessions expose idle time via `xprintidle` (milliseconds).
    /// Wayland and headless sessions have no portable equivalent; the
    /// probe fails there and the loop degrades to "idle unknown".
    pub(super) async fn idle_duration() -> Result<Duration, ProbeError> {
        let output = tokio::process::Command::new("xprintidle")
            .output()
            .await
            .map_err(|e| ProbeError(format!("failed to run xprintidle: {e}")))?;

        if !output.status.success() {
            return Err(ProbeError(format!(
                "xprintidle exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let millis = parse_idle_millis(&stdout)
            .ok_or_else(|| ProbeError(format!("unparseable xprintidle output: {stdout:?}")))?;
        Ok(Duration::from_millis(millis))
    }

    fn parse_idle_millis(output: &str) -> Option<u64> {
        output.trim().parse().ok()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parses_millisecond_output() {
            assert_eq!(parse_idle_millis("902412\n"), Some(902_412));
            assert_eq!(parse_idle_millis("0"), Some(0));
        }

        #[test]
        fn garbage_is_none() {
            assert_eq!(parse_idle_millis("not-a-number"), None);
            assert_eq!(parse_idle_millis(""), None);
        }
    }
}

// ─── Other platforms ────────────────────────────────────────────────────────

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
mod imp {
    use std::time::Duration;

    use siesta_core::ProbeError;

    pub(super) async fn idle_duration() -> Result<Duration, ProbeError> {
        Err(ProbeError(
            "no idle probe available on this platform".to_string(),
        ))
    }
}
