//! Sleep-policy configuration and the on-disk provider.
//!
//! The policy lives in a hand-editable JSON file and is re-read at the
//! top of every cycle, so edits take effect without a restart (within
//! one check interval). A missing file is created with pretty-printed
//! defaults on first run. A file that exists but fails to parse or
//! validate is surfaced as a [`ConfigError`] and never replaced --
//! a parse failure can indicate disk corruption the operator should
//! see, not paper over.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::metric::MetricKind;

/// File name of the per-host policy document.
const POLICY_FILE_NAME: &str = "policy.json";

/// Subdirectory under the OS configuration directory.
const CONFIG_SUBDIR: &str = "siesta";

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "SIESTA_CONFIG_DIR";

/// How a metric that could not be sampled this cycle is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailMode {
    /// An unavailable counter does not count as exceeded. One flaky
    /// counter can then never pin the machine awake indefinitely.
    #[default]
    FailOpen,
    /// An unavailable counter counts as exceeded: unknown means busy.
    FailClosed,
}

/// Enable flag and threshold for one metric kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPolicy {
    pub enabled: bool,
    pub threshold: f64,
}

impl MetricPolicy {
    pub const fn new(enabled: bool, threshold: f64) -> Self {
        Self { enabled, threshold }
    }
}

fn default_check_interval() -> u64 {
    10
}

fn default_idle_threshold() -> u64 {
    15
}

fn default_cpu_policy() -> MetricPolicy {
    MetricPolicy::new(true, 15.0)
}

fn default_ram_policy() -> MetricPolicy {
    MetricPolicy::new(true, 3.0)
}

fn default_bandwidth_policy() -> MetricPolicy {
    MetricPolicy::new(true, 500.0)
}

/// Immutable-per-cycle snapshot of the sleep policy.
///
/// Missing fields in the on-disk document fall back to their defaults,
/// so a hand-edited partial file stays valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Seconds between cycles. Must be at least 1.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Minutes of user inactivity required before a permitted cycle
    /// actually suspends the machine.
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_mins: u64,

    /// Processor utilization policy, percent.
    #[serde(default = "default_cpu_policy")]
    pub cpu: MetricPolicy,

    /// Used-memory policy, GiB.
    #[serde(default = "default_ram_policy")]
    pub ram: MetricPolicy,

    /// Aggregate network throughput policy, KiB/s.
    #[serde(default = "default_bandwidth_policy")]
    pub bandwidth: MetricPolicy,

    /// Treatment of metrics that could not be sampled this cycle.
    #[serde(default)]
    pub on_sampling_error: FailMode,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            idle_threshold_mins: default_idle_threshold(),
            cpu: default_cpu_policy(),
            ram: default_ram_policy(),
            bandwidth: default_bandwidth_policy(),
            on_sampling_error: FailMode::default(),
        }
    }
}

impl PolicyConfig {
    pub fn policy_for(&self, kind: MetricKind) -> MetricPolicy {
        match kind {
            MetricKind::Cpu => self.cpu,
            MetricKind::Ram => self.ram,
            MetricKind::Bandwidth => self.bandwidth,
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_mins * 60)
    }

    /// Reject values that would make the loop misbehave: a zero check
    /// interval busy-loops, and non-finite or negative thresholds make
    /// comparisons meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "check_interval_secs must be at least 1".to_string(),
            ));
        }

        for kind in MetricKind::ALL {
            let policy = self.policy_for(kind);
            if !policy.threshold.is_finite() || policy.threshold < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{kind} threshold must be a non-negative finite number, got {}",
                    policy.threshold,
                )));
            }
        }

        Ok(())
    }
}

/// Supplies the policy snapshot for one cycle.
///
/// Invoked fresh at the top of every cycle; implementations decide how
/// (and whether) to cache.
pub trait ConfigProvider {
    fn load(&self) -> Result<PolicyConfig, ConfigError>;
}

/// JSON-file-backed [`ConfigProvider`].
pub struct FileConfigProvider {
    path: PathBuf,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve the conventional policy file location:
    /// `$SIESTA_CONFIG_DIR/policy.json` when the override is set,
    /// otherwise `<OS config dir>/siesta/policy.json`.
    pub fn at_default_location() -> Result<Self, ConfigError> {
        let dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or(ConfigError::NoConfigDir)?
                .join(CONFIG_SUBDIR),
        };
        Ok(Self::new(dir.join(POLICY_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// First-run path: create the parent directory and write the
    /// defaults, pretty-printed so operators can hand-edit the file.
    fn write_defaults(&self) -> Result<PolicyConfig, ConfigError> {
        let defaults = PolicyConfig::default();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: self.path.clone(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(&defaults)
            .expect("default PolicyConfig is always serialisable");
        fs::write(&self.path, json).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;

        tracing::info!(path = %self.path.display(), "Created default policy file");
        Ok(defaults)
    }
}

impl ConfigProvider for FileConfigProvider {
    fn load(&self) -> Result<PolicyConfig, ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return self.write_defaults(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let config: PolicyConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("siesta-config-tests")
            .join(format!("{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn defaults_match_the_shipped_policy() {
        let config = PolicyConfig::default();
        assert_eq!(config.check_interval_secs, 10);
        assert_eq!(config.idle_threshold_mins, 15);
        assert_eq!(config.cpu, MetricPolicy::new(true, 15.0));
        assert_eq!(config.ram, MetricPolicy::new(true, 3.0));
        assert_eq!(config.bandwidth, MetricPolicy::new(true, 500.0));
        assert_eq!(config.on_sampling_error, FailMode::FailOpen);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_is_created_with_pretty_defaults() {
        let path = scratch_dir("missing").join("policy.json");
        let provider = FileConfigProvider::new(&path);

        let config = provider.load().expect("first load should create defaults");
        assert_eq!(config, PolicyConfig::default());

        let on_disk = fs::read_to_string(&path).expect("file should now exist");
        // Pretty-printed: multi-line with stable indentation.
        assert!(on_disk.lines().count() > 1);
        assert!(on_disk.contains("\"check_interval_secs\": 10"));

        // Second load reads the file it just wrote.
        let reloaded = provider.load().expect("reload should parse");
        assert_eq!(reloaded, config);
    }

    #[test]
    fn corrupt_file_is_surfaced_not_replaced() {
        let path = scratch_dir("corrupt").join("policy.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let provider = FileConfigProvider::new(&path);
        assert_matches!(provider.load(), Err(ConfigError::Parse { .. }));

        // The corrupt content must still be on disk, untouched.
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn zero_check_interval_is_rejected() {
        let path = scratch_dir("zero-interval").join("policy.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{ "check_interval_secs": 0 }"#).unwrap();

        let provider = FileConfigProvider::new(&path);
        assert_matches!(provider.load(), Err(ConfigError::Invalid(_)));
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let config = PolicyConfig {
            ram: MetricPolicy::new(true, -1.0),
            ..PolicyConfig::default()
        };
        assert_matches!(config.validate(), Err(ConfigError::Invalid(_)));
    }

    #[test]
    fn partial_file_falls_back_to_field_defaults() {
        let path = scratch_dir("partial").join("policy.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"{ "cpu": { "enabled": false, "threshold": 40.0 }, "idle_threshold_mins": 30 }"#,
        )
        .unwrap();

        let config = FileConfigProvider::new(&path).load().expect("should parse");
        assert_eq!(config.cpu, MetricPolicy::new(false, 40.0));
        assert_eq!(config.idle_threshold_mins, 30);
        // Untouched fields keep their defaults.
        assert_eq!(config.check_interval_secs, 10);
        assert_eq!(config.bandwidth, MetricPolicy::new(true, 500.0));
    }

    #[test]
    fn fail_mode_round_trips_as_snake_case() {
        let json = serde_json::to_string(&FailMode::FailClosed).unwrap();
        assert_eq!(json, "\"fail_closed\"");
        let parsed: FailMode = serde_json::from_str("\"fail_open\"").unwrap();
        assert_eq!(parsed, FailMode::FailOpen);
    }
}
