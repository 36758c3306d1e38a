//! # Constants
//!
//! Shared constants used throughout the provider.
//!
//! These values represent the documented defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group shared by every vals-operator resource
pub const VALS_OPERATOR_GROUP: &str = "digitalis.io";

/// Default time-to-live of a `ValsSecret`, in seconds
pub const DEFAULT_SECRET_TTL_SECS: i64 = 3600;

/// Default Kubernetes secret type rendered by a `ValsSecret`
pub const DEFAULT_SECRET_TYPE: &str = "Opaque";

/// Environment variable carrying a platform path-separated list of credential files
pub const KUBE_CONFIG_PATHS_ENV: &str = "KUBE_CONFIG_PATHS";

/// Exec credential API version used when the exec block names none
pub const DEFAULT_EXEC_API_VERSION: &str = "client.authentication.k8s.io/v1beta1";

/// Endpoint used when no host could be resolved at all.
/// Operations against it fail at first network use.
pub const UNCONFIGURED_HOST: &str = "http://localhost";

/// Default deadline for a single invocation (seconds)
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Default log filter directive for this crate
pub const DEFAULT_LOG_FILTER: &str = "vals_operator_provider=info";
