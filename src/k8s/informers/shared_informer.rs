/**
 * Shared index informer
 *
 * Mirrors one resource collection into a kube reflector store through an
 * initial list followed by a watch, and fans every change out to the
 * registered event handlers.
 */
use super::config::{INITIAL_BACKOFF_SECONDS, MAX_BACKOFF_SECONDS, WATCH_TIMEOUT_SECONDS};
use super::handler::{
    HandlerRegistration, HandlerRegistry, InformerEvent, ResourceEventHandler, deliver,
};
use super::indexer::{Indexer, Indexers};
use super::list_watch::{ListWatch, WatchedResource};
use crate::error::{Error, Result};
use futures::StreamExt;
use kube::ResourceExt;
use kube::api::{ListParams, WatchEvent, WatchParams};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::reflector::store::Writer;
use kube::runtime::watcher;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct SharedIndexInformer<K: WatchedResource> {
    list_watch: Arc<dyn ListWatch<K>>,
    resync_period: Duration,
    indexer: Indexer<K>,
    /// Taken by the run loop; `None` once started
    writer: Mutex<Option<Writer<K>>>,
    handlers: HandlerRegistry<K>,
    /// Held while a store change is applied and its notifications collected,
    /// and while a new handler is registered; never held while handlers run
    dispatch: Mutex<()>,
    synced: watch::Sender<bool>,
    last_sync_resource_version: Mutex<String>,
    started: AtomicBool,
}

impl<K: WatchedResource> SharedIndexInformer<K> {
    /// Build an informer. Nothing is listed or watched until [`run`](Self::run).
    ///
    /// A zero `resync_period` disables resync.
    pub fn new<L>(list_watch: L, resync_period: Duration, indexers: Indexers<K>) -> Self
    where
        L: ListWatch<K> + 'static,
    {
        let writer = Writer::default();
        let indexer = Indexer::new(writer.as_reader(), indexers);
        let (synced, _) = watch::channel(false);

        Self {
            list_watch: Arc::new(list_watch),
            resync_period,
            indexer,
            writer: Mutex::new(Some(writer)),
            handlers: HandlerRegistry::new(),
            dispatch: Mutex::new(()),
            synced,
            last_sync_resource_version: Mutex::new(String::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Read view over the informer's cache; empty until the first list completes
    #[must_use]
    pub fn indexer(&self) -> Indexer<K> {
        self.indexer.clone()
    }

    #[must_use]
    pub const fn resync_period(&self) -> Duration {
        self.resync_period
    }

    #[must_use]
    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Resource version of the most recent list, or empty before the first one
    #[must_use]
    pub fn last_sync_resource_version(&self) -> String {
        self.last_sync_resource_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolves once the initial list has been applied to the cache
    pub async fn wait_for_sync(&self) -> bool {
        let mut rx = self.synced.subscribe();
        rx.wait_for(|synced| *synced).await.is_ok()
    }

    /// Register a handler. If the cache has already synced, the handler first
    /// receives an add for every cached object; changes applied after
    /// registration may reach it while that replay is still running.
    ///
    /// Safe to call from inside another handler's callback.
    pub fn add_event_handler<H>(&self, handler: H) -> HandlerRegistration
    where
        H: ResourceEventHandler<K> + 'static,
    {
        let handler: Arc<dyn ResourceEventHandler<K>> = Arc::new(handler);
        let (registration, replay) = {
            let _guard = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
            let replay: Vec<InformerEvent<K>> = if self.has_synced() {
                self.indexer.list().into_iter().map(InformerEvent::Added).collect()
            } else {
                Vec::new()
            };
            (self.handlers.add(handler.clone()), replay)
        };

        deliver(&[handler], &replay);
        registration
    }

    /// Returns false if the registration was unknown
    pub fn remove_event_handler(&self, registration: &HandlerRegistration) -> bool {
        self.handlers.remove(registration)
    }

    /// Channel-backed handler; dropping the receiver silences it
    pub fn subscribe(&self) -> (HandlerRegistration, mpsc::UnboundedReceiver<InformerEvent<K>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.add_event_handler(tx), rx)
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Add secondary indexes before the informer is started
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyStarted` once [`run`](Self::run) has been called,
    /// or `Error::Custom` if an index name is already registered
    pub fn add_indexers(&self, indexers: Indexers<K>) -> Result<()> {
        if self.is_started() {
            return Err(Error::AlreadyStarted(format!(
                "{} informer has already started",
                K::kind(&())
            )));
        }
        self.indexer.add_indexers(indexers)
    }

    /// List, then watch, until `stop` is cancelled.
    ///
    /// Failures are logged and retried with exponential backoff; an expired
    /// resource version relists immediately. Calling `run` on an informer that
    /// is already running logs a warning and returns.
    pub async fn run(self: Arc<Self>, stop: CancellationToken) {
        let kind = K::kind(&());
        let taken = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut writer) = taken else {
            warn!("⚠️ {} informer is already running", kind);
            return;
        };
        self.started.store(true, Ordering::SeqCst);
        info!("🔍 Starting {} informer (resync {:?})", kind, self.resync_period);

        let mut backoff_seconds = INITIAL_BACKOFF_SECONDS;
        while !stop.is_cancelled() {
            match self
                .list_and_watch(&mut writer, &stop, &mut backoff_seconds)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_expired() => {
                    info!("🔄 {} watch expired ({}), relisting", kind, e);
                }
                Err(e) => {
                    error!(
                        "❌ {} informer failed: {}, relisting in {}s",
                        kind, e, backoff_seconds
                    );
                    tokio::select! {
                        () = stop.cancelled() => break,
                        () = sleep(Duration::from_secs(backoff_seconds)) => {}
                    }
                    backoff_seconds = (backoff_seconds * 2).min(MAX_BACKOFF_SECONDS);
                }
            }
        }

        info!("🛑 {} informer stopped", kind);
    }

    /// Returns `Ok(())` only when `stop` fires. The backoff is reset once a
    /// watch delivers an event, not on list success alone.
    async fn list_and_watch(
        &self,
        writer: &mut Writer<K>,
        stop: &CancellationToken,
        backoff_seconds: &mut u64,
    ) -> Result<()> {
        let list_params = ListParams::default();
        let page = tokio::select! {
            () = stop.cancelled() => return Ok(()),
            page = self.list_watch.list(&list_params) => page?,
        };
        debug!(
            "📋 Listed {} {} at resource version {}",
            page.items.len(),
            K::plural(&()),
            page.resource_version
        );

        let mut resource_version = page.resource_version.clone();
        *self
            .last_sync_resource_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = resource_version.clone();
        self.replace(writer, page.items);

        let mut resync = self.resync_timer();
        let params = WatchParams::default().timeout(WATCH_TIMEOUT_SECONDS);

        loop {
            let mut stream = tokio::select! {
                () = stop.cancelled() => return Ok(()),
                stream = self.list_watch.watch(&params, &resource_version) => stream?,
            };

            loop {
                tokio::select! {
                    () = stop.cancelled() => return Ok(()),
                    () = next_resync(&mut resync) => self.resync(),
                    event = stream.next() => match event {
                        Some(Ok(event)) => {
                            self.apply_watch_event(writer, event, &mut resource_version)?;
                            *backoff_seconds = INITIAL_BACKOFF_SECONDS;
                        }
                        Some(Err(e)) => return Err(e),
                        None => {
                            debug!("🔁 {} watch closed, resuming from {}", K::kind(&()), resource_version);
                            break;
                        }
                    },
                }
            }
        }
    }

    /// Swap the cache for a fresh list, mark the informer synced, and notify
    /// the difference
    fn replace(&self, writer: &mut Writer<K>, items: Vec<K>) {
        let (handlers, events) = {
            let _guard = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);

            let mut previous: HashMap<ObjectRef<K>, Arc<K>> = self
                .indexer
                .list()
                .into_iter()
                .map(|obj| (ObjectRef::from_obj(obj.as_ref()), obj))
                .collect();
            let keys: Vec<ObjectRef<K>> = items.iter().map(ObjectRef::from_obj).collect();

            writer.apply_watcher_event(&watcher::Event::Init);
            for item in items {
                writer.apply_watcher_event(&watcher::Event::InitApply(item));
            }
            writer.apply_watcher_event(&watcher::Event::InitDone);

            let mut events = Vec::with_capacity(keys.len() + previous.len());
            for key in keys {
                let Some(current) = self.indexer.get(&key) else {
                    continue;
                };
                events.push(match previous.remove(&key) {
                    Some(old) => InformerEvent::Updated { old, new: current },
                    None => InformerEvent::Added(current),
                });
            }
            events.extend(previous.into_values().map(InformerEvent::Deleted));

            self.synced.send_replace(true);
            (self.handlers.snapshot(), events)
        };

        deliver(&handlers, &events);
    }

    fn apply_watch_event(
        &self,
        writer: &mut Writer<K>,
        event: WatchEvent<K>,
        resource_version: &mut String,
    ) -> Result<()> {
        let (handlers, events) = {
            let _guard = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);

            let events = match event {
                WatchEvent::Added(obj) | WatchEvent::Modified(obj) => {
                    if let Some(rv) = obj.resource_version() {
                        *resource_version = rv;
                    }
                    let key = ObjectRef::from_obj(&obj);
                    let old = self.indexer.get(&key);
                    writer.apply_watcher_event(&watcher::Event::Apply(obj));

                    match (old, self.indexer.get(&key)) {
                        (Some(old), Some(new)) => vec![InformerEvent::Updated { old, new }],
                        (None, Some(new)) => vec![InformerEvent::Added(new)],
                        (_, None) => Vec::new(),
                    }
                }
                WatchEvent::Deleted(obj) => {
                    if let Some(rv) = obj.resource_version() {
                        *resource_version = rv;
                    }
                    let gone = Arc::new(obj.clone());
                    writer.apply_watcher_event(&watcher::Event::Delete(obj));
                    vec![InformerEvent::Deleted(gone)]
                }
                WatchEvent::Bookmark(bookmark) => {
                    *resource_version = bookmark.metadata.resource_version;
                    Vec::new()
                }
                WatchEvent::Error(response) if response.code == 410 => {
                    return Err(Error::ResourceExpired(response.message.clone()));
                }
                WatchEvent::Error(response) => {
                    return Err(Error::WatchFailed {
                        code: response.code,
                        message: response.message.clone(),
                    });
                }
            };
            (self.handlers.snapshot(), events)
        };

        deliver(&handlers, &events);
        Ok(())
    }

    /// Re-deliver every cached object as an update
    fn resync(&self) {
        let (handlers, events) = {
            let _guard = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
            let events: Vec<InformerEvent<K>> = self
                .indexer
                .list()
                .into_iter()
                .map(|obj| InformerEvent::Updated {
                    old: obj.clone(),
                    new: obj,
                })
                .collect();
            debug!("⏰ Resyncing {} {}", events.len(), K::plural(&()));
            (self.handlers.snapshot(), events)
        };

        deliver(&handlers, &events);
    }

    fn resync_timer(&self) -> Option<Interval> {
        if self.resync_period.is_zero() {
            return None;
        }
        let mut interval = interval_at(Instant::now() + self.resync_period, self.resync_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(interval)
    }
}

async fn next_resync(resync: &mut Option<Interval>) {
    match resync {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
