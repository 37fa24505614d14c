// Client creation with custom user-agent support for kube 2.x
use crate::error::Result as SiResult;
use hyper::http::{HeaderName, HeaderValue};
use kube::{Client, Config};
use tracing::warn;

use super::{USER_AGENT, USER_AGENT_ENV};

/// Resolve the user agent: the env override wins, then the caller's value,
/// then the package default.
#[must_use]
pub fn resolve_user_agent(custom_user_agent: Option<&str>) -> String {
    std::env::var(USER_AGENT_ENV)
        .ok()
        .filter(|ua| !ua.trim().is_empty())
        .or_else(|| custom_user_agent.map(str::to_string))
        .unwrap_or_else(|| USER_AGENT.to_string())
}

/// Add a user-agent header to `config`. Invalid header values are logged and
/// skipped so the kube default user agent stays in place.
pub fn add_user_agent_header(config: &mut Config, custom_user_agent: Option<&str>) {
    let user_agent = resolve_user_agent(custom_user_agent);
    match HeaderValue::from_str(&user_agent) {
        Ok(header_value) => config
            .headers
            .push((HeaderName::from_static("user-agent"), header_value)),
        Err(e) => warn!("⚠️ Ignoring invalid user agent {:?}: {}", user_agent, e),
    }
}

/// Create a new k8s client to interact with k8s cluster api
///
/// # Errors
///
/// Will return `Err` if the kube config can not be inferred or the client
/// can not be built from it
pub async fn new(custom_user_agent: Option<&str>) -> SiResult<Client> {
    let mut config = Config::infer().await?;
    add_user_agent_header(&mut config, custom_user_agent);
    let client = Client::try_from(config)?;
    Ok(client)
}
