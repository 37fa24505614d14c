/**
 * Read side of an informer's cache: the kube reflector store plus named
 * index functions. Index lookups are filtered scans of the store; nothing is
 * materialized per index.
 */
use super::list_watch::WatchedResource;
use crate::error::{Error, Result};
use kube::ResourceExt;
use kube::runtime::reflector::{ObjectRef, Store};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Name of the built-in index over `metadata.namespace`
pub const NAMESPACE_INDEX: &str = "namespace";

/// Computes the index values an object is filed under
pub type IndexFunc<K> = Arc<dyn Fn(&K) -> Vec<String> + Send + Sync>;

/// Named index functions, evaluated per object at lookup time
pub struct Indexers<K>(HashMap<String, IndexFunc<K>>);

impl<K> Default for Indexers<K> {
    fn default() -> Self {
        Self(HashMap::new())
    }
}

impl<K> Clone for Indexers<K> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<K> std::fmt::Debug for Indexers<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.0.keys()).finish()
    }
}

impl<K: WatchedResource> Indexers<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexers holding only [`NAMESPACE_INDEX`]
    #[must_use]
    pub fn namespaced() -> Self {
        Self::new().with(NAMESPACE_INDEX, |obj: &K| obj.namespace().into_iter().collect())
    }

    #[must_use]
    pub fn with<F>(mut self, name: &str, index_func: F) -> Self
    where
        F: Fn(&K) -> Vec<String> + Send + Sync + 'static,
    {
        self.0.insert(name.to_string(), Arc::new(index_func));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `namespace/name` for namespaced objects, `name` otherwise
pub fn meta_namespace_key<K: WatchedResource>(obj: &K) -> String {
    match obj.namespace() {
        Some(ns) if !ns.is_empty() => format!("{ns}/{}", obj.name_any()),
        _ => obj.name_any(),
    }
}

/// Reverse of [`meta_namespace_key`]
#[must_use]
pub fn object_ref_from_key<K: WatchedResource>(key: &str) -> ObjectRef<K> {
    match key.split_once('/') {
        Some((ns, name)) => ObjectRef::new(name).within(ns),
        None => ObjectRef::new(key),
    }
}

/// Thread-safe, read-only view over an informer's store
pub struct Indexer<K: WatchedResource> {
    store: Store<K>,
    indexers: Arc<RwLock<Indexers<K>>>,
}

impl<K: WatchedResource> Clone for Indexer<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            indexers: self.indexers.clone(),
        }
    }
}

impl<K: WatchedResource> Indexer<K> {
    pub(crate) fn new(store: Store<K>, indexers: Indexers<K>) -> Self {
        Self {
            store,
            indexers: Arc::new(RwLock::new(indexers)),
        }
    }

    /// Register more index functions. Duplicate names are rejected and leave
    /// the existing indexers untouched.
    pub(crate) fn add_indexers(&self, extra: Indexers<K>) -> Result<()> {
        let mut indexers = self.indexers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(dup) = extra.0.keys().find(|name| indexers.0.contains_key(*name)) {
            return Err(Error::Custom(format!("indexer conflict: {dup}")));
        }
        indexers.0.extend(extra.0);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &ObjectRef<K>) -> Option<Arc<K>> {
        self.store.get(key)
    }

    /// Look up by `namespace/name` or `name`
    #[must_use]
    pub fn get_by_key(&self, key: &str) -> Option<Arc<K>> {
        self.store.get(&object_ref_from_key(key))
    }

    #[must_use]
    pub fn list(&self) -> Vec<Arc<K>> {
        self.store.state()
    }

    #[must_use]
    pub fn list_keys(&self) -> Vec<String> {
        self.store
            .state()
            .iter()
            .map(|obj| meta_namespace_key(obj.as_ref()))
            .collect()
    }

    /// Objects whose `index_name` values include `value`. Scans the whole
    /// store, so the cost is linear in the cache size.
    ///
    /// # Errors
    ///
    /// Returns `Error::IndexNotFound` when no index function is registered
    /// under `index_name`
    pub fn by_index(&self, index_name: &str, value: &str) -> Result<Vec<Arc<K>>> {
        let index_func = {
            let indexers = self.indexers.read().unwrap_or_else(PoisonError::into_inner);
            indexers
                .0
                .get(index_name)
                .cloned()
                .ok_or_else(|| Error::IndexNotFound(index_name.to_string()))?
        };

        Ok(self
            .store
            .state()
            .into_iter()
            .filter(|obj| index_func(obj.as_ref()).iter().any(|v| v == value))
            .collect())
    }

    /// Distinct values currently filed under `index_name`; also a full scan
    ///
    /// # Errors
    ///
    /// Returns `Error::IndexNotFound` for an unknown index
    pub fn index_values(&self, index_name: &str) -> Result<Vec<String>> {
        let index_func = {
            let indexers = self.indexers.read().unwrap_or_else(PoisonError::into_inner);
            indexers
                .0
                .get(index_name)
                .cloned()
                .ok_or_else(|| Error::IndexNotFound(index_name.to_string()))?
        };

        let mut values: Vec<String> = self
            .store
            .state()
            .iter()
            .flat_map(|obj| index_func(obj.as_ref()))
            .collect();
        values.sort_unstable();
        values.dedup();
        Ok(values)
    }

    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        let indexers = self.indexers.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = indexers.names().map(str::to_string).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PersistentVolumeClaim;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::runtime::reflector::store::Writer;
    use kube::runtime::watcher::Event;

    fn pvc(ns: &str, name: &str) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(ns.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn indexer_with(items: Vec<PersistentVolumeClaim>) -> (Writer<PersistentVolumeClaim>, Indexer<PersistentVolumeClaim>) {
        let mut writer = Writer::default();
        for item in items {
            writer.apply_watcher_event(&Event::Apply(item));
        }
        let indexer = Indexer::new(writer.as_reader(), Indexers::namespaced());
        (writer, indexer)
    }

    #[test]
    fn test_keys_round_trip_namespace() {
        assert_eq!(meta_namespace_key(&pvc("team-a", "data")), "team-a/data");
        let key: ObjectRef<PersistentVolumeClaim> = object_ref_from_key("team-a/data");
        assert_eq!(key.name, "data");
        assert_eq!(key.namespace.as_deref(), Some("team-a"));
    }

    #[test]
    fn test_get_by_key_and_namespace_index() {
        let (_writer, indexer) = indexer_with(vec![
            pvc("team-a", "data"),
            pvc("team-a", "logs"),
            pvc("team-b", "data"),
        ]);

        assert_eq!(indexer.len(), 3);
        assert!(indexer.get_by_key("team-b/data").is_some());
        assert!(indexer.get_by_key("team-c/data").is_none());
        assert_eq!(indexer.by_index(NAMESPACE_INDEX, "team-a").unwrap().len(), 2);
        assert_eq!(
            indexer.index_values(NAMESPACE_INDEX).unwrap(),
            vec!["team-a".to_string(), "team-b".to_string()]
        );
    }

    #[test]
    fn test_unknown_index_is_an_error() {
        let (_writer, indexer) = indexer_with(vec![pvc("team-a", "data")]);
        let err = indexer.by_index("by-class", "fast").unwrap_err();
        assert!(matches!(err, Error::IndexNotFound(name) if name == "by-class"));
    }

    #[test]
    fn test_add_indexers_rejects_duplicates() {
        let (_writer, indexer) = indexer_with(vec![]);
        let dup = Indexers::new().with(NAMESPACE_INDEX, |_: &PersistentVolumeClaim| vec![]);
        assert!(indexer.add_indexers(dup).is_err());

        let extra = Indexers::new().with("by-name", |obj: &PersistentVolumeClaim| vec![obj.name_any()]);
        assert!(indexer.add_indexers(extra).is_ok());
        assert_eq!(indexer.index_names(), vec!["by-name".to_string(), NAMESPACE_INDEX.to_string()]);
    }
}
