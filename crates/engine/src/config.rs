//! Engine timing configuration, loaded from environment variables.

use std::time::Duration;

use wayfarer_core::estimation::ESTIMATE_TTL_SECS;

/// Default transport deadline on the submission call.
const DEFAULT_SUBMIT_CALL_TIMEOUT_SECS: u64 = 45;
/// Default grace period before recovery polling starts for a known job.
const DEFAULT_GRACE_WINDOW_SECS: u64 = 180;
/// Default recovery window: poll duration and candidate recency bound.
const DEFAULT_RECOVERY_WINDOW_SECS: u64 = 300;
/// Default cadence of recovery polls (and synthetic progress frames).
const DEFAULT_RECOVERY_POLL_SECS: u64 = 5;

/// Timing knobs for the submission protocol.
///
/// All fields have defaults suitable for interactive use; override via
/// environment variables in production.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Transport-level deadline on the initial submission call.
    pub submit_call_timeout: Duration,
    /// How long a known job may go without a terminal status before the
    /// recovery poll starts.
    pub grace_window: Duration,
    /// Bounded span for recovery: both how long polling continues and how
    /// recent a candidate's `created_at` must be.
    pub recovery_window: Duration,
    /// Poll cadence during recovery; also paces synthetic progress frames.
    pub recovery_poll_interval: Duration,
    /// Lifetime of cached cost estimates.
    pub estimate_ttl: Duration,
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default |
    /// |------------------------------|---------|
    /// | `SUBMIT_CALL_TIMEOUT_SECS`   | `45`    |
    /// | `GRACE_WINDOW_SECS`          | `180`   |
    /// | `RECOVERY_WINDOW_SECS`       | `300`   |
    /// | `RECOVERY_POLL_SECS`         | `5`     |
    /// | `ESTIMATE_TTL_SECS`          | `30`    |
    pub fn from_env() -> Self {
        Self {
            submit_call_timeout: env_secs(
                "SUBMIT_CALL_TIMEOUT_SECS",
                DEFAULT_SUBMIT_CALL_TIMEOUT_SECS,
            ),
            grace_window: env_secs("GRACE_WINDOW_SECS", DEFAULT_GRACE_WINDOW_SECS),
            recovery_window: env_secs("RECOVERY_WINDOW_SECS", DEFAULT_RECOVERY_WINDOW_SECS),
            recovery_poll_interval: env_secs("RECOVERY_POLL_SECS", DEFAULT_RECOVERY_POLL_SECS),
            estimate_ttl: env_secs("ESTIMATE_TTL_SECS", ESTIMATE_TTL_SECS),
        }
    }

    /// Overall backstop for a submission whose job id is known: the job
    /// has the grace window plus the full recovery window to resolve.
    pub fn backstop_after_accept(&self) -> Duration {
        self.grace_window + self.recovery_window
    }

    /// Overall backstop once the submission call itself has timed out:
    /// recovery is already running, so only its window remains.
    pub fn backstop_after_call_timeout(&self) -> Duration {
        self.recovery_window
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            submit_call_timeout: Duration::from_secs(DEFAULT_SUBMIT_CALL_TIMEOUT_SECS),
            grace_window: Duration::from_secs(DEFAULT_GRACE_WINDOW_SECS),
            recovery_window: Duration::from_secs(DEFAULT_RECOVERY_WINDOW_SECS),
            recovery_poll_interval: Duration::from_secs(DEFAULT_RECOVERY_POLL_SECS),
            estimate_ttl: Duration::from_secs(ESTIMATE_TTL_SECS),
        }
    }
}

fn env_secs(name: &str, default: u64) -> Duration {
    let secs: u64 = std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or_else(|_| panic!("{name} must be a number of seconds"));
    Duration::from_secs(secs)
}
