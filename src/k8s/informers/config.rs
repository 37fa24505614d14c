/**
 * Configuration constants for informers and the shared informer factory
 */
use std::time::Duration;

/// Initial backoff time in seconds after a failed list or watch
pub const INITIAL_BACKOFF_SECONDS: u64 = 1;

/// Maximum backoff time in seconds between relist attempts
pub const MAX_BACKOFF_SECONDS: u64 = 60;

/// Watch stream timeout in seconds (294 vs 300 to allow 6 seconds for graceful shutdown)
pub const WATCH_TIMEOUT_SECONDS: u32 = 294;

/// Page size for paginated initial lists
pub const LIST_PAGE_SIZE: u32 = 500;

/// Resync period used by the CLI when none is given
pub const DEFAULT_RESYNC_SECONDS: u64 = 300;

/// Annotation marking a `StorageClass` as the cluster default
pub const DEFAULT_CLASS_ANNOTATION: &str = "storageclass.kubernetes.io/is-default-class";

/// Pre-GA spelling of [`DEFAULT_CLASS_ANNOTATION`], still honoured by the API server
pub const BETA_DEFAULT_CLASS_ANNOTATION: &str = "storageclass.beta.kubernetes.io/is-default-class";

/// Settings shared by every informer a factory creates
#[derive(Debug, Clone, Default)]
pub struct FactoryConfig {
    /// Resync period for informers without a custom one; zero disables resync
    pub default_resync: Duration,
    /// Restrict namespaced kinds to this namespace; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Label selector applied to every list and watch call
    pub label_selector: Option<String>,
    /// Field selector applied to every list and watch call
    pub field_selector: Option<String>,
}

impl FactoryConfig {
    #[must_use]
    pub const fn with_resync(default_resync: Duration) -> Self {
        Self {
            default_resync,
            namespace: None,
            label_selector: None,
            field_selector: None,
        }
    }
}

/// Validate configuration constants at compile time
const _: () = {
    assert!(INITIAL_BACKOFF_SECONDS > 0, "INITIAL_BACKOFF_SECONDS must be greater than 0");
    assert!(MAX_BACKOFF_SECONDS >= INITIAL_BACKOFF_SECONDS, "MAX_BACKOFF_SECONDS must not be below INITIAL_BACKOFF_SECONDS");
    assert!(WATCH_TIMEOUT_SECONDS > 0, "WATCH_TIMEOUT_SECONDS must be greater than 0");
    assert!(LIST_PAGE_SIZE > 0, "LIST_PAGE_SIZE must be greater than 0");
};
