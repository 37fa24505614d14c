use super::config::LIST_PAGE_SIZE;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use kube::Resource;
use kube::api::{Api, ListParams, WatchEvent, WatchParams};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// Bounds every resource an informer can mirror must satisfy.
///
/// Static k8s-openapi types all qualify; the unit dynamic type lets the
/// informer build `ObjectRef`s without extra runtime type information.
pub trait WatchedResource:
    Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static
{
}

impl<K> WatchedResource for K where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static
{
}

/// Result of a complete (all pages) list call
#[derive(Debug, Clone)]
pub struct ListPage<K> {
    pub items: Vec<K>,
    /// Resource version to start the following watch from
    pub resource_version: String,
}

pub type WatchStream<K> = BoxStream<'static, Result<WatchEvent<K>>>;

/// The list and watch calls an informer drives
#[async_trait]
pub trait ListWatch<K>: Send + Sync {
    async fn list(&self, params: &ListParams) -> Result<ListPage<K>>;

    async fn watch(&self, params: &WatchParams, resource_version: &str) -> Result<WatchStream<K>>;
}

/// `ListWatch` backed by a typed `kube::Api`
pub struct ApiListWatch<K> {
    api: Api<K>,
    label_selector: Option<String>,
    field_selector: Option<String>,
}

impl<K: WatchedResource> ApiListWatch<K> {
    #[must_use]
    pub const fn new(api: Api<K>) -> Self {
        Self {
            api,
            label_selector: None,
            field_selector: None,
        }
    }

    /// Apply selectors to every list and watch call
    #[must_use]
    pub fn with_selectors(mut self, labels: Option<String>, fields: Option<String>) -> Self {
        self.label_selector = labels;
        self.field_selector = fields;
        self
    }

    fn tweak_list(&self, params: &ListParams) -> ListParams {
        let mut params = params.clone();
        if let Some(labels) = &self.label_selector {
            params = params.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            params = params.fields(fields);
        }
        if params.limit.is_none() {
            params = params.limit(LIST_PAGE_SIZE);
        }
        params
    }

    fn tweak_watch(&self, params: &WatchParams) -> WatchParams {
        let mut params = params.clone();
        if let Some(labels) = &self.label_selector {
            params = params.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            params = params.fields(fields);
        }
        params
    }
}

#[async_trait]
impl<K: WatchedResource> ListWatch<K> for ApiListWatch<K> {
    async fn list(&self, params: &ListParams) -> Result<ListPage<K>> {
        let mut params = self.tweak_list(params);
        let mut items = Vec::new();
        let mut resource_version = None;

        loop {
            let page = self.api.list(&params).await?;
            // the first page pins the snapshot every continuation is served from
            if resource_version.is_none() {
                resource_version = page.metadata.resource_version.clone();
            }
            items.extend(page.items);

            match page.metadata.continue_.filter(|token| !token.is_empty()) {
                Some(token) => {
                    debug!("📄 Continuing {} list ({} items so far)", K::kind(&()), items.len());
                    params = params.continue_token(&token);
                }
                None => break,
            }
        }

        Ok(ListPage {
            items,
            resource_version: resource_version.unwrap_or_default(),
        })
    }

    async fn watch(&self, params: &WatchParams, resource_version: &str) -> Result<WatchStream<K>> {
        let stream = self
            .api
            .watch(&self.tweak_watch(params), resource_version)
            .await?;
        Ok(stream.map_err(Error::from).boxed())
    }
}
