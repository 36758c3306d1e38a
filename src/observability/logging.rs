//! # Logging
//!
//! Tracing subscriber setup for the provider and the `valsctl` binary.
//!
//! Output goes to stderr so that command output on stdout stays machine readable.
//! `RUST_LOG` wins over the configured level when it is set.

use tracing_subscriber::EnvFilter;

/// Build the filter used by [`init_tracing`].
///
/// `level` is either a bare level (`debug`) applied to this crate, or a full
/// filter directive (`vals_operator_provider=debug,kube=info`).
#[must_use]
pub fn env_filter(level: Option<&str>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let directive = match level {
        Some(level) if level.contains('=') => level.to_string(),
        Some(level) if !level.trim().is_empty() => {
            format!("vals_operator_provider={}", level.trim())
        }
        _ => crate::constants::DEFAULT_LOG_FILTER.to_string(),
    };

    EnvFilter::try_new(&directive)
        .unwrap_or_else(|_| EnvFilter::new(crate::constants::DEFAULT_LOG_FILTER))
}

/// Install the global subscriber.
///
/// Does nothing if a subscriber was already installed (tests, embedding hosts).
pub fn init_tracing(level: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
