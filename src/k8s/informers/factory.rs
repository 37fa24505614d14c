/**
 * Shared informer factory
 *
 * One informer per resource kind per factory. Every accessor goes through
 * `informer_for`, which memoizes the informer under its `ResourceKey`, so all
 * consumers of a kind share a single list/watch connection and cache.
 */
use super::config::FactoryConfig;
use super::core::CoreGroup;
use super::list_watch::{ApiListWatch, WatchedResource};
use super::shared_informer::SharedIndexInformer;
use super::storage::StorageGroup;
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Registry key for one resource kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl ResourceKey {
    #[must_use]
    pub fn of<K: Resource<DynamicType = ()>>() -> Self {
        Self {
            group: K::group(&()).into_owned(),
            version: K::version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

/// Type-erased informer as held by the registry
#[async_trait]
trait RegisteredInformer: Send + Sync {
    fn spawn(self: Arc<Self>, stop: CancellationToken) -> JoinHandle<()>;

    async fn wait_for_sync(&self) -> bool;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

#[async_trait]
impl<K: WatchedResource> RegisteredInformer for SharedIndexInformer<K> {
    fn spawn(self: Arc<Self>, stop: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(stop))
    }

    async fn wait_for_sync(&self) -> bool {
        Self::wait_for_sync(self).await
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Builder for [`SharedInformerFactory`]
pub struct SharedInformerFactoryBuilder {
    client: Client,
    config: FactoryConfig,
    custom_resync: HashMap<ResourceKey, Duration>,
}

impl SharedInformerFactoryBuilder {
    #[must_use]
    pub fn default_resync(mut self, resync: Duration) -> Self {
        self.config.default_resync = resync;
        self
    }

    /// Limit namespaced kinds to one namespace
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn label_selector(mut self, selector: impl Into<String>) -> Self {
        self.config.label_selector = Some(selector.into());
        self
    }

    #[must_use]
    pub fn field_selector(mut self, selector: impl Into<String>) -> Self {
        self.config.field_selector = Some(selector.into());
        self
    }

    /// Override the default resync period for kind `K`
    #[must_use]
    pub fn custom_resync<K: Resource<DynamicType = ()>>(mut self, resync: Duration) -> Self {
        self.custom_resync.insert(ResourceKey::of::<K>(), resync);
        self
    }

    #[must_use]
    pub fn config(mut self, config: FactoryConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn build(self) -> SharedInformerFactory {
        SharedInformerFactory {
            client: self.client,
            config: self.config,
            custom_resync: self.custom_resync,
            informers: Mutex::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
            stop: CancellationToken::new(),
        }
    }
}

pub struct SharedInformerFactory {
    client: Client,
    config: FactoryConfig,
    custom_resync: HashMap<ResourceKey, Duration>,
    informers: Mutex<HashMap<ResourceKey, Arc<dyn RegisteredInformer>>>,
    running: Mutex<HashMap<ResourceKey, JoinHandle<()>>>,
    stop: CancellationToken,
}

impl SharedInformerFactory {
    #[must_use]
    pub fn new(client: Client, default_resync: Duration) -> Self {
        Self::builder(client).default_resync(default_resync).build()
    }

    #[must_use]
    pub fn builder(client: Client) -> SharedInformerFactoryBuilder {
        SharedInformerFactoryBuilder {
            client,
            config: FactoryConfig::default(),
            custom_resync: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub const fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Resync period informers for `key` are created with
    #[must_use]
    pub fn resync_for(&self, key: &ResourceKey) -> Duration {
        self.custom_resync
            .get(key)
            .copied()
            .unwrap_or(self.config.default_resync)
    }

    pub fn storage(&self) -> StorageGroup<'_> {
        StorageGroup::new(self)
    }

    pub fn core(&self) -> CoreGroup<'_> {
        CoreGroup::new(self)
    }

    /// List/watch over every object of a cluster-scoped kind, or every
    /// namespace of a namespaced one
    #[must_use]
    pub fn list_watch_all<K: WatchedResource>(&self) -> ApiListWatch<K> {
        self.with_selectors(ApiListWatch::new(Api::all(self.client.clone())))
    }

    /// List/watch honouring the factory's namespace restriction
    #[must_use]
    pub fn list_watch_namespaced<K>(&self) -> ApiListWatch<K>
    where
        K: WatchedResource + Resource<Scope = NamespaceResourceScope>,
    {
        let api = match &self.config.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        self.with_selectors(ApiListWatch::new(api))
    }

    fn with_selectors<K: WatchedResource>(&self, list_watch: ApiListWatch<K>) -> ApiListWatch<K> {
        list_watch.with_selectors(
            self.config.label_selector.clone(),
            self.config.field_selector.clone(),
        )
    }

    fn lock_informers(&self) -> MutexGuard<'_, HashMap<ResourceKey, Arc<dyn RegisteredInformer>>> {
        // entries are immutable Arcs, so a panic elsewhere cannot leave the map half-written
        self.informers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the informer registered for `K`, creating it with
    /// `new_informer` on first use. `new_informer` receives the resync period
    /// for `K` and runs under the registry lock, so it must not block.
    pub fn informer_for<K, F>(&self, new_informer: F) -> Arc<SharedIndexInformer<K>>
    where
        K: WatchedResource,
        F: FnOnce(&Self, Duration) -> SharedIndexInformer<K>,
    {
        let key = ResourceKey::of::<K>();
        let mut informers = self.lock_informers();

        if let Some(existing) = informers.get(&key) {
            match existing.clone().into_any().downcast::<SharedIndexInformer<K>>() {
                Ok(informer) => return informer,
                Err(_) => {
                    error!(
                        "❌ Informer registered for {} has a different Rust type; returning an unshared informer",
                        key
                    );
                    return Arc::new(new_informer(self, self.resync_for(&key)));
                }
            }
        }

        debug!("🔧 Creating informer for {}", key);
        let informer = Arc::new(new_informer(self, self.resync_for(&key)));
        informers.insert(key, informer.clone());
        informer
    }

    /// Keys of every informer requested so far
    #[must_use]
    pub fn registered(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self.lock_informers().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Spawn the run loop of every registered informer that is not running yet.
    ///
    /// Must be called within a Tokio runtime. Informers requested after this
    /// call need another `start`.
    pub fn start(&self) {
        if self.stop.is_cancelled() {
            warn!("⚠️ Informer factory has been shut down; not starting informers");
            return;
        }

        let informers: Vec<(ResourceKey, Arc<dyn RegisteredInformer>)> = self
            .lock_informers()
            .iter()
            .map(|(key, informer)| (key.clone(), informer.clone()))
            .collect();

        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, informer) in informers {
            if running.contains_key(&key) {
                continue;
            }
            info!("🚀 Starting informer for {}", key);
            let handle = informer.spawn(self.stop.child_token());
            running.insert(key, handle);
        }
    }

    /// Wait until every started informer has synced its cache. An informer
    /// reports `false` if the factory is shut down first.
    pub async fn wait_for_cache_sync(&self) -> HashMap<ResourceKey, bool> {
        let started: Vec<(ResourceKey, Arc<dyn RegisteredInformer>)> = {
            let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            let informers = self.lock_informers();
            running
                .keys()
                .filter_map(|key| informers.get(key).map(|inf| (key.clone(), inf.clone())))
                .collect()
        };

        let mut results = HashMap::with_capacity(started.len());
        for (key, informer) in started {
            let synced = tokio::select! {
                () = self.stop.cancelled() => false,
                synced = informer.wait_for_sync() => synced,
            };
            debug!("🔄 {} synced: {}", key, synced);
            results.insert(key, synced);
        }
        results
    }

    /// Stop every informer and wait for their run loops to exit
    pub async fn shutdown(&self) {
        self.stop.cancel();

        let handles: Vec<(ResourceKey, JoinHandle<()>)> = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        for (key, handle) in handles {
            if let Err(e) = handle.await {
                warn!("⚠️ Informer task for {} ended abnormally: {}", key, e);
            }
        }
        info!("🛑 Informer factory shut down");
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.stop.is_cancelled()
    }
}
