use super::factory::SharedInformerFactory;
use super::typed::{ClusterInformer, NamespacedInformer};
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};

pub type PersistentVolumeInformer<'a> = ClusterInformer<'a, PersistentVolume>;
pub type PersistentVolumeClaimInformer<'a> = NamespacedInformer<'a, PersistentVolumeClaim>;

/// Index of persistent volumes by `spec.storageClassName`
pub const PV_STORAGE_CLASS_INDEX: &str = "storage-class";

/// Index function for [`PV_STORAGE_CLASS_INDEX`]; unclassed volumes are not indexed
#[must_use]
pub fn pv_storage_class_index(pv: &PersistentVolume) -> Vec<String> {
    pv.spec
        .as_ref()
        .and_then(|spec| spec.storage_class_name.clone())
        .filter(|name| !name.is_empty())
        .into_iter()
        .collect()
}

/// Core (`""` group) informers used alongside the storage ones
pub struct CoreGroup<'a> {
    factory: &'a SharedInformerFactory,
}

impl<'a> CoreGroup<'a> {
    pub(crate) const fn new(factory: &'a SharedInformerFactory) -> Self {
        Self { factory }
    }

    #[must_use]
    pub const fn v1(&self) -> CoreV1<'a> {
        CoreV1 {
            factory: self.factory,
        }
    }
}

pub struct CoreV1<'a> {
    factory: &'a SharedInformerFactory,
}

impl<'a> CoreV1<'a> {
    #[must_use]
    pub const fn persistent_volumes(&self) -> PersistentVolumeInformer<'a> {
        ClusterInformer::new(self.factory)
    }

    #[must_use]
    pub const fn persistent_volume_claims(&self) -> PersistentVolumeClaimInformer<'a> {
        NamespacedInformer::new(self.factory)
    }
}
