pub mod config;
pub mod core;
pub mod factory;
pub mod handler;
pub mod indexer;
pub mod list_watch;
pub mod lister;
pub mod shared_informer;
pub mod storage;
pub mod typed;

pub use config::FactoryConfig;
pub use factory::{ResourceKey, SharedInformerFactory, SharedInformerFactoryBuilder};
pub use handler::{EventHandlerFns, HandlerRegistration, InformerEvent, ResourceEventHandler};
pub use indexer::{Indexer, Indexers, NAMESPACE_INDEX, meta_namespace_key};
pub use list_watch::{ApiListWatch, ListPage, ListWatch, WatchStream, WatchedResource};
pub use lister::{
    ClusterLister, CsiDriverLister, Lister, NamespaceLister, PersistentVolumeClaimLister,
    PersistentVolumeLister, StorageClassLister, VolumeAttachmentLister,
};
pub use shared_informer::SharedIndexInformer;
pub use storage::{StorageClassInformer, is_default_class};
pub use typed::{ClusterInformer, NamespacedInformer};
