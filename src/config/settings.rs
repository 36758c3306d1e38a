//! # Runtime Settings
//!
//! Process-level settings loaded from environment variables.

use std::time::Duration;

/// Process-level configuration
///
/// All settings have defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Log level or filter directive (`LOG_LEVEL`)
    /// A bare level applies to this crate only; `RUST_LOG` still wins when set
    pub log_level: String,
    /// Per-invocation deadline in seconds (`OPERATION_TIMEOUT_SECS`)
    /// Zero disables the deadline
    pub operation_timeout_secs: u64,
    /// User agent stamped on every request (`PROVIDER_USER_AGENT`)
    pub user_agent: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            operation_timeout_secs: crate::constants::DEFAULT_OPERATION_TIMEOUT_SECS,
            user_agent: default_user_agent(),
        }
    }
}

impl RuntimeSettings {
    /// Load settings from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: env_var_or_default_str("LOG_LEVEL", &defaults.log_level),
            operation_timeout_secs: env_var_or_default(
                "OPERATION_TIMEOUT_SECS",
                defaults.operation_timeout_secs,
            ),
            user_agent: env_var_or_default_str("PROVIDER_USER_AGENT", &defaults.user_agent),
        }
    }

    /// Get the per-invocation deadline, if any
    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_secs > 0).then(|| Duration::from_secs(self.operation_timeout_secs))
    }
}

/// `vals-operator-provider/<version> (<git hash>)`
#[must_use]
pub fn default_user_agent() -> String {
    format!(
        "vals-operator-provider/{} ({})",
        env!("CARGO_PKG_VERSION"),
        option_env!("BUILD_GIT_HASH").unwrap_or("unknown")
    )
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// `true`, `1`, `yes` and `on` in any case
pub(crate) fn parse_bool(value: &str) -> bool {
    let v_lower = value.to_lowercase();
    v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
}

/// Read environment variable as string or return default
pub(crate) fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read a non-empty environment variable
pub(crate) fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
