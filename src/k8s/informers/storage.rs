use super::config::{BETA_DEFAULT_CLASS_ANNOTATION, DEFAULT_CLASS_ANNOTATION};
use super::factory::SharedInformerFactory;
use super::typed::ClusterInformer;
use k8s_openapi::api::storage::v1::{CSIDriver, StorageClass, VolumeAttachment};
use kube::ResourceExt;

pub type StorageClassInformer<'a> = ClusterInformer<'a, StorageClass>;
pub type VolumeAttachmentInformer<'a> = ClusterInformer<'a, VolumeAttachment>;
pub type CsiDriverInformer<'a> = ClusterInformer<'a, CSIDriver>;

/// `storage.k8s.io` informers
pub struct StorageGroup<'a> {
    factory: &'a SharedInformerFactory,
}

impl<'a> StorageGroup<'a> {
    pub(crate) const fn new(factory: &'a SharedInformerFactory) -> Self {
        Self { factory }
    }

    #[must_use]
    pub const fn v1(&self) -> StorageV1<'a> {
        StorageV1 {
            factory: self.factory,
        }
    }
}

pub struct StorageV1<'a> {
    factory: &'a SharedInformerFactory,
}

impl<'a> StorageV1<'a> {
    #[must_use]
    pub const fn storage_classes(&self) -> StorageClassInformer<'a> {
        ClusterInformer::new(self.factory)
    }

    #[must_use]
    pub const fn volume_attachments(&self) -> VolumeAttachmentInformer<'a> {
        ClusterInformer::new(self.factory)
    }

    #[must_use]
    pub const fn csi_drivers(&self) -> CsiDriverInformer<'a> {
        ClusterInformer::new(self.factory)
    }
}

/// True when the class carries the default-class annotation set to `"true"`
#[must_use]
pub fn is_default_class(class: &StorageClass) -> bool {
    let annotations = class.annotations();
    [DEFAULT_CLASS_ANNOTATION, BETA_DEFAULT_CLASS_ANNOTATION]
        .iter()
        .any(|key| annotations.get(*key).is_some_and(|v| v == "true"))
}
