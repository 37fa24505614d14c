use super::factory::SharedInformerFactory;
use super::indexer::Indexers;
use super::list_watch::WatchedResource;
use super::lister::{ClusterLister, Lister};
use super::shared_informer::SharedIndexInformer;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::Resource;
use std::marker::PhantomData;
use std::sync::Arc;

/// Accessor for the factory's informer of one cluster-scoped kind
pub struct ClusterInformer<'a, K> {
    factory: &'a SharedInformerFactory,
    _kind: PhantomData<fn() -> K>,
}

impl<'a, K> ClusterInformer<'a, K>
where
    K: WatchedResource + Resource<Scope = ClusterResourceScope>,
{
    pub(crate) const fn new(factory: &'a SharedInformerFactory) -> Self {
        Self {
            factory,
            _kind: PhantomData,
        }
    }

    /// The factory's single informer for `K`, created on first call
    #[must_use]
    pub fn informer(&self) -> Arc<SharedIndexInformer<K>> {
        self.factory.informer_for(|factory, resync| {
            SharedIndexInformer::new(factory.list_watch_all::<K>(), resync, Indexers::new())
        })
    }

    #[must_use]
    pub fn lister(&self) -> ClusterLister<K> {
        ClusterLister::new(self.informer().indexer())
    }
}

/// Accessor for the factory's informer of one namespaced kind
pub struct NamespacedInformer<'a, K> {
    factory: &'a SharedInformerFactory,
    _kind: PhantomData<fn() -> K>,
}

impl<'a, K> NamespacedInformer<'a, K>
where
    K: WatchedResource + Resource<Scope = NamespaceResourceScope>,
{
    pub(crate) const fn new(factory: &'a SharedInformerFactory) -> Self {
        Self {
            factory,
            _kind: PhantomData,
        }
    }

    /// The factory's single informer for `K`, created on first call with the
    /// namespace index
    #[must_use]
    pub fn informer(&self) -> Arc<SharedIndexInformer<K>> {
        self.factory.informer_for(|factory, resync| {
            SharedIndexInformer::new(
                factory.list_watch_namespaced::<K>(),
                resync,
                Indexers::namespaced(),
            )
        })
    }

    #[must_use]
    pub fn lister(&self) -> Lister<K> {
        Lister::new(self.informer().indexer())
    }
}
