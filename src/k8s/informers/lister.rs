use super::indexer::{Indexer, NAMESPACE_INDEX};
use super::list_watch::WatchedResource;
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use k8s_openapi::api::storage::v1::{CSIDriver, StorageClass, VolumeAttachment};
use kube::ResourceExt;
use kube::core::{Selector, SelectorExt};
use kube::runtime::reflector::ObjectRef;
use std::sync::Arc;
use tracing::warn;

pub type StorageClassLister = ClusterLister<StorageClass>;
pub type VolumeAttachmentLister = ClusterLister<VolumeAttachment>;
pub type CsiDriverLister = ClusterLister<CSIDriver>;
pub type PersistentVolumeLister = ClusterLister<PersistentVolume>;
pub type PersistentVolumeClaimLister = Lister<PersistentVolumeClaim>;

fn not_found<K: WatchedResource>(name: &str) -> Error {
    Error::NotFound {
        resource: K::plural(&()).into_owned(),
        name: name.to_string(),
    }
}

fn select<K: WatchedResource>(objects: Vec<Arc<K>>, selector: &Selector) -> Vec<Arc<K>> {
    if selector.selects_all() {
        return objects;
    }
    objects
        .into_iter()
        .filter(|obj| selector.matches(obj.labels()))
        .collect()
}

/// Read-only queries over a cluster-scoped informer cache
pub struct ClusterLister<K: WatchedResource> {
    indexer: Indexer<K>,
}

impl<K: WatchedResource> Clone for ClusterLister<K> {
    fn clone(&self) -> Self {
        Self {
            indexer: self.indexer.clone(),
        }
    }
}

impl<K: WatchedResource> ClusterLister<K> {
    #[must_use]
    pub const fn new(indexer: Indexer<K>) -> Self {
        Self { indexer }
    }

    /// # Errors
    ///
    /// Returns `Error::NotFound` when `name` is not in the cache
    pub fn get(&self, name: &str) -> Result<Arc<K>> {
        self.indexer
            .get(&ObjectRef::new(name))
            .ok_or_else(|| not_found::<K>(name))
    }

    #[must_use]
    pub fn list(&self, selector: &Selector) -> Vec<Arc<K>> {
        select(self.indexer.list(), selector)
    }

    #[must_use]
    pub fn indexer(&self) -> &Indexer<K> {
        &self.indexer
    }
}

/// Read-only queries over a namespaced informer cache
pub struct Lister<K: WatchedResource> {
    indexer: Indexer<K>,
}

impl<K: WatchedResource> Clone for Lister<K> {
    fn clone(&self) -> Self {
        Self {
            indexer: self.indexer.clone(),
        }
    }
}

impl<K: WatchedResource> Lister<K> {
    #[must_use]
    pub const fn new(indexer: Indexer<K>) -> Self {
        Self { indexer }
    }

    /// Matching objects across every namespace in the cache
    #[must_use]
    pub fn list(&self, selector: &Selector) -> Vec<Arc<K>> {
        select(self.indexer.list(), selector)
    }

    #[must_use]
    pub fn namespace(&self, namespace: &str) -> NamespaceLister<K> {
        NamespaceLister {
            indexer: self.indexer.clone(),
            namespace: namespace.to_string(),
        }
    }

    #[must_use]
    pub fn indexer(&self) -> &Indexer<K> {
        &self.indexer
    }
}

/// Queries limited to one namespace
pub struct NamespaceLister<K: WatchedResource> {
    indexer: Indexer<K>,
    namespace: String,
}

impl<K: WatchedResource> NamespaceLister<K> {
    /// # Errors
    ///
    /// Returns `Error::NotFound` when `name` is not cached in this namespace
    pub fn get(&self, name: &str) -> Result<Arc<K>> {
        self.indexer
            .get(&ObjectRef::new(name).within(&self.namespace))
            .ok_or_else(|| not_found::<K>(name))
    }

    #[must_use]
    pub fn list(&self, selector: &Selector) -> Vec<Arc<K>> {
        let objects = match self.indexer.by_index(NAMESPACE_INDEX, &self.namespace) {
            Ok(objects) => objects,
            Err(e) => {
                warn!("⚠️ Namespace index unavailable ({}), scanning cache", e);
                self.indexer
                    .list()
                    .into_iter()
                    .filter(|obj| obj.namespace().as_deref() == Some(self.namespace.as_str()))
                    .collect()
            }
        };
        select(objects, selector)
    }
}
