use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Receives notifications from an informer's run loop.
///
/// Calls are made synchronously from the loop, so implementations should hand
/// work off rather than block.
pub trait ResourceEventHandler<K>: Send + Sync {
    fn on_add(&self, obj: &Arc<K>);

    /// Also called on every resync with `old` and `new` pointing at the same object
    fn on_update(&self, old: &Arc<K>, new: &Arc<K>);

    fn on_delete(&self, obj: &Arc<K>);

    /// A closed handler is dropped from the informer before the next delivery
    fn is_closed(&self) -> bool {
        false
    }
}

/// Notification delivered to [`SharedIndexInformer::subscribe`](super::SharedIndexInformer::subscribe) receivers
#[derive(Debug, Clone)]
pub enum InformerEvent<K> {
    Added(Arc<K>),
    Updated { old: Arc<K>, new: Arc<K> },
    Deleted(Arc<K>),
}

impl<K> InformerEvent<K> {
    #[must_use]
    pub fn object(&self) -> &Arc<K> {
        match self {
            Self::Added(obj) | Self::Deleted(obj) | Self::Updated { new: obj, .. } => obj,
        }
    }
}

impl<K: Send + Sync> ResourceEventHandler<K> for mpsc::UnboundedSender<InformerEvent<K>> {
    fn on_add(&self, obj: &Arc<K>) {
        // receiver dropped means nobody is listening any more
        let _ = self.send(InformerEvent::Added(obj.clone()));
    }

    fn on_update(&self, old: &Arc<K>, new: &Arc<K>) {
        let _ = self.send(InformerEvent::Updated {
            old: old.clone(),
            new: new.clone(),
        });
    }

    fn on_delete(&self, obj: &Arc<K>) {
        let _ = self.send(InformerEvent::Deleted(obj.clone()));
    }

    fn is_closed(&self) -> bool {
        mpsc::UnboundedSender::is_closed(self)
    }
}

type AddFn<K> = Box<dyn Fn(&Arc<K>) + Send + Sync>;
type UpdateFn<K> = Box<dyn Fn(&Arc<K>, &Arc<K>) + Send + Sync>;

/// Closure-based handler; unset callbacks are no-ops
pub struct EventHandlerFns<K> {
    add: Option<AddFn<K>>,
    update: Option<UpdateFn<K>>,
    delete: Option<AddFn<K>>,
}

impl<K> Default for EventHandlerFns<K> {
    fn default() -> Self {
        Self {
            add: None,
            update: None,
            delete: None,
        }
    }
}

impl<K> EventHandlerFns<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_add(mut self, f: impl Fn(&Arc<K>) + Send + Sync + 'static) -> Self {
        self.add = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_update(mut self, f: impl Fn(&Arc<K>, &Arc<K>) + Send + Sync + 'static) -> Self {
        self.update = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_delete(mut self, f: impl Fn(&Arc<K>) + Send + Sync + 'static) -> Self {
        self.delete = Some(Box::new(f));
        self
    }
}

impl<K: Send + Sync> ResourceEventHandler<K> for EventHandlerFns<K> {
    fn on_add(&self, obj: &Arc<K>) {
        if let Some(f) = &self.add {
            f(obj);
        }
    }

    fn on_update(&self, old: &Arc<K>, new: &Arc<K>) {
        if let Some(f) = &self.update {
            f(old, new);
        }
    }

    fn on_delete(&self, obj: &Arc<K>) {
        if let Some(f) = &self.delete {
            f(obj);
        }
    }
}

/// Handle returned by `add_event_handler`, used to remove the handler again
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerRegistration {
    id: String,
}

impl HandlerRegistration {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Fan-out list of handlers for one informer
pub(crate) struct HandlerRegistry<K> {
    handlers: RwLock<Vec<(HandlerRegistration, Arc<dyn ResourceEventHandler<K>>)>>,
}

impl<K> HandlerRegistry<K> {
    pub(crate) fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, handler: Arc<dyn ResourceEventHandler<K>>) -> HandlerRegistration {
        let registration = HandlerRegistration {
            id: Uuid::new_v4().to_string(),
        };
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((registration.clone(), handler));
        registration
    }

    pub(crate) fn remove(&self, registration: &HandlerRegistration) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(reg, _)| reg != registration);
        handlers.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Copy of the live handlers, pruning closed ones, so no lock is held
    /// while handlers run
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn ResourceEventHandler<K>>> {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.retain(|(registration, handler)| {
            let closed = handler.is_closed();
            if closed {
                debug!("🧹 Dropping closed handler {}", registration);
            }
            !closed
        });
        handlers.iter().map(|(_, handler)| handler.clone()).collect()
    }
}

/// Hand `events` to every handler in order
pub(crate) fn deliver<K>(handlers: &[Arc<dyn ResourceEventHandler<K>>], events: &[InformerEvent<K>]) {
    for event in events {
        for handler in handlers {
            match event {
                InformerEvent::Added(obj) => handler.on_add(obj),
                InformerEvent::Updated { old, new } => handler.on_update(old, new),
                InformerEvent::Deleted(obj) => handler.on_delete(obj),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_remove_handler() {
        let registry: HandlerRegistry<String> = HandlerRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let reg1 = registry.add(Arc::new(tx.clone()));
        let reg2 = registry.add(Arc::new(tx));
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(&reg1));
        assert!(!registry.remove(&reg1));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(&reg2));
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_channel_handler_receives_events() {
        let registry: HandlerRegistry<String> = HandlerRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.add(Arc::new(tx));

        let obj = Arc::new("fast-ssd".to_string());
        deliver(
            &registry.snapshot(),
            &[InformerEvent::Added(obj.clone()), InformerEvent::Deleted(obj)],
        );

        assert!(matches!(rx.recv().await, Some(InformerEvent::Added(o)) if *o == "fast-ssd"));
        assert!(matches!(rx.recv().await, Some(InformerEvent::Deleted(_))));
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let registry: HandlerRegistry<String> = HandlerRegistry::new();
        let (kept, _kept_rx) = mpsc::unbounded_channel();
        let (dropped, dropped_rx) = mpsc::unbounded_channel();
        registry.add(Arc::new(kept));
        registry.add(Arc::new(dropped));
        drop(dropped_rx);

        deliver(&registry.snapshot(), &[InformerEvent::Added(Arc::new("gp3".to_string()))]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_fns_handler_skips_unset_callbacks() {
        let adds = Arc::new(AtomicUsize::new(0));
        let counter = adds.clone();
        let handler = EventHandlerFns::new().with_add(move |_: &Arc<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let obj = Arc::new("standard".to_string());
        handler.on_add(&obj);
        handler.on_update(&obj, &obj);
        handler.on_delete(&obj);
        assert_eq!(adds.load(Ordering::SeqCst), 1);
    }
}
