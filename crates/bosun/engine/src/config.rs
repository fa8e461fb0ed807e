//! Configuration for the lifecycle engines

use bosun_types::ClusterOpSpec;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Admission control options
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Op spec used for operations the engine builds itself
    #[serde(default)]
    pub default_op_spec: ClusterOpSpec,

    /// Bounded wait applied when stopping a state machine executor
    #[serde(default)]
    pub stop_retry: RetrySpec,

    /// Pause between state machine passes that failed, in milliseconds
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u64,

    /// Task runner monitoring interval in milliseconds
    #[serde(default = "default_task_monitor_interval")]
    pub task_monitor_interval_ms: u64,

    /// Capacity of the lifecycle event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            admission: AdmissionConfig::default(),
            default_op_spec: ClusterOpSpec::default(),
            stop_retry: RetrySpec::default(),
            error_backoff_ms: default_error_backoff(),
            task_monitor_interval_ms: default_task_monitor_interval(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from defaults, an optional file and `BOSUN_*` env vars
    ///
    /// Nested keys use a double underscore in the environment, for example
    /// `BOSUN_ADMISSION__DISABLE_CMDL_ARGS=true`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&EngineConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("BOSUN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn task_monitor_interval(&self) -> Duration {
        Duration::from_millis(self.task_monitor_interval_ms)
    }
}

/// Cluster-level admission options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Host directories that may be mounted; empty allows any
    #[serde(default)]
    pub allowed_mount_dirs: Vec<String>,

    /// Reject specs that pass command line arguments
    #[serde(default)]
    pub disable_cmdl_args: bool,

    /// Allow raw host device access
    #[serde(default)]
    pub enable_raw_device_access: bool,

    /// Maximum combined length of command line arguments
    #[serde(default = "default_max_cmdl_args_length")]
    pub max_cmdl_args_length: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            allowed_mount_dirs: Vec::new(),
            disable_cmdl_args: false,
            enable_raw_device_access: false,
            max_cmdl_args_length: default_max_cmdl_args_length(),
        }
    }
}

/// Polling policy for bounded waits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySpec {
    /// Pause between attempts in milliseconds
    #[serde(default = "default_retry_interval")]
    pub interval_ms: u64,

    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,

    /// Overall deadline in milliseconds
    #[serde(default = "default_retry_duration")]
    pub max_duration_ms: u64,
}

impl Default for RetrySpec {
    fn default() -> Self {
        Self {
            interval_ms: default_retry_interval(),
            max_attempts: default_retry_attempts(),
            max_duration_ms: default_retry_duration(),
        }
    }
}

impl RetrySpec {
    pub fn new(interval: Duration, max_attempts: u32, max_duration: Duration) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            max_attempts,
            max_duration_ms: max_duration.as_millis() as u64,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    /// Poll `condition` until it holds or the attempts or deadline run out
    ///
    /// Returns whether the condition was observed to hold.
    pub async fn wait_until(&self, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + self.max_duration();
        for _ in 0..self.max_attempts {
            if condition() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.interval()).await;
        }
        condition()
    }
}

// Default value helpers
fn default_error_backoff() -> u64 {
    100
}

fn default_task_monitor_interval() -> u64 {
    5_000
}

fn default_event_channel_capacity() -> usize {
    crate::events::EVENT_CHANNEL_CAPACITY
}

fn default_max_cmdl_args_length() -> usize {
    2048
}

fn default_retry_interval() -> u64 {
    1_000
}

fn default_retry_attempts() -> u32 {
    60
}

fn default_retry_duration() -> u64 {
    60_000
}
