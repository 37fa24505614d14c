/**
Storage class usage report built from informer listers
*/
use crate::error::Result;
use crate::k8s::informers::core::PV_STORAGE_CLASS_INDEX;
use crate::k8s::informers::{
    PersistentVolumeClaimLister, PersistentVolumeLister, StorageClassLister, is_default_class,
};
use itertools::Itertools;
use kube::ResourceExt;
use kube::core::Selector;
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassUsage {
    pub name: String,
    pub provisioner: String,
    pub reclaim_policy: String,
    pub binding_mode: String,
    pub default: bool,
    pub volumes: usize,
    pub claims: usize,
}

/// One row per cached storage class, sorted with the default class first
///
/// # Errors
///
/// Returns `Error::IndexNotFound` if the persistent volume informer was not
/// given the storage class index
pub fn storage_class_usage(
    classes: &StorageClassLister,
    volumes: &PersistentVolumeLister,
    claims: &PersistentVolumeClaimLister,
) -> Result<Vec<ClassUsage>> {
    let all_claims = claims.list(&Selector::default());

    classes
        .list(&Selector::default())
        .into_iter()
        .map(|class| -> Result<ClassUsage> {
            let name = class.name_any();
            let volume_count = volumes
                .indexer()
                .by_index(PV_STORAGE_CLASS_INDEX, &name)?
                .len();
            let claim_count = all_claims
                .iter()
                .filter(|pvc| {
                    pvc.spec
                        .as_ref()
                        .and_then(|spec| spec.storage_class_name.as_deref())
                        == Some(name.as_str())
                })
                .count();

            Ok(ClassUsage {
                provisioner: class.provisioner.clone(),
                reclaim_policy: class.reclaim_policy.clone().unwrap_or_else(|| "Delete".to_string()),
                binding_mode: class
                    .volume_binding_mode
                    .clone()
                    .unwrap_or_else(|| "Immediate".to_string()),
                default: is_default_class(&class),
                volumes: volume_count,
                claims: claim_count,
                name,
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(|rows| {
            rows.into_iter()
                .sorted_by(|a, b| b.default.cmp(&a.default).then_with(|| a.name.cmp(&b.name)))
                .collect()
        })
}

/// Plain-text table of `rows`
#[must_use]
pub fn format_table(rows: &[ClassUsage]) -> String {
    let width = rows
        .iter()
        .map(|row| row.name.len() + if row.default { 10 } else { 0 })
        .chain(std::iter::once("NAME".len()))
        .max()
        .unwrap_or(4);

    let mut out = format!(
        "{:<width$}  {:<28}  {:<8}  {:<20}  {:>7}  {:>6}\n",
        "NAME", "PROVISIONER", "RECLAIM", "BINDING", "VOLUMES", "CLAIMS"
    );
    for row in rows {
        let name = if row.default {
            format!("{} (default)", row.name)
        } else {
            row.name.clone()
        };
        let _ = writeln!(
            out,
            "{:<width$}  {:<28}  {:<8}  {:<20}  {:>7}  {:>6}",
            name, row.provisioner, row.reclaim_policy, row.binding_mode, row.volumes, row.claims
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::informers::config::DEFAULT_CLASS_ANNOTATION;
    use crate::k8s::informers::core::pv_storage_class_index;
    use crate::k8s::informers::{Indexer, Indexers};
    use k8s_openapi::api::core::v1::{
        PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeSpec,
    };
    use k8s_openapi::api::storage::v1::StorageClass;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::runtime::reflector::store::Writer;
    use kube::runtime::watcher::Event;
    use std::collections::BTreeMap;

    fn class(name: &str, default: bool) -> StorageClass {
        StorageClass {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                annotations: default.then(|| {
                    BTreeMap::from([(DEFAULT_CLASS_ANNOTATION.to_string(), "true".to_string())])
                }),
                ..Default::default()
            },
            provisioner: "ebs.csi.aws.com".to_string(),
            reclaim_policy: Some("Retain".to_string()),
            ..Default::default()
        }
    }

    fn volume(name: &str, class: &str) -> PersistentVolume {
        PersistentVolume {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                storage_class_name: Some(class.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn claim(name: &str, class: &str) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("team-a".to_string()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                storage_class_name: Some(class.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_usage_counts_and_default_first() {
        let mut class_writer = Writer::default();
        class_writer.apply_watcher_event(&Event::Apply(class("archive", false)));
        class_writer.apply_watcher_event(&Event::Apply(class("gp3", true)));

        let mut pv_writer = Writer::default();
        pv_writer.apply_watcher_event(&Event::Apply(volume("pv-1", "gp3")));
        pv_writer.apply_watcher_event(&Event::Apply(volume("pv-2", "gp3")));
        pv_writer.apply_watcher_event(&Event::Apply(volume("pv-3", "archive")));

        let mut pvc_writer = Writer::default();
        pvc_writer.apply_watcher_event(&Event::Apply(claim("data", "gp3")));

        let classes = StorageClassLister::new(Indexer::new(class_writer.as_reader(), Indexers::new()));
        let volumes = PersistentVolumeLister::new(Indexer::new(
            pv_writer.as_reader(),
            Indexers::new().with(PV_STORAGE_CLASS_INDEX, pv_storage_class_index),
        ));
        let claims =
            PersistentVolumeClaimLister::new(Indexer::new(pvc_writer.as_reader(), Indexers::namespaced()));

        let rows = storage_class_usage(&classes, &volumes, &claims).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "gp3");
        assert!(rows[0].default);
        assert_eq!((rows[0].volumes, rows[0].claims), (2, 1));
        assert_eq!((rows[1].volumes, rows[1].claims), (1, 0));
        assert_eq!(rows[1].binding_mode, "Immediate");

        let table = format_table(&rows);
        assert!(table.starts_with("NAME"));
        assert!(table.contains("gp3 (default)"));
    }

    #[test]
    fn test_missing_pv_index_is_reported() {
        let mut class_writer = Writer::default();
        class_writer.apply_watcher_event(&Event::Apply(class("gp3", true)));
        let pv_writer: Writer<PersistentVolume> = Writer::default();
        let pvc_writer: Writer<PersistentVolumeClaim> = Writer::default();

        let result = storage_class_usage(
            &StorageClassLister::new(Indexer::new(class_writer.as_reader(), Indexers::new())),
            &PersistentVolumeLister::new(Indexer::new(pv_writer.as_reader(), Indexers::new())),
            &PersistentVolumeClaimLister::new(Indexer::new(pvc_writer.as_reader(), Indexers::new())),
        );
        assert!(result.is_err());
    }
}
