pub mod client;
pub mod informers;

/// Default user agent - automatically uses the package version
///
/// All clients handed to a `SharedInformerFactory` by this crate are created
/// through `client::new(Some(USER_AGENT))`, so API server audit logs can
/// attribute list and watch traffic to the informers.
///
/// User-agent can be overridden via the `STORAGE_INFORMERS_USER_AGENT`
/// environment variable.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Environment variable that overrides [`USER_AGENT`]
pub const USER_AGENT_ENV: &str = "STORAGE_INFORMERS_USER_AGENT";
