use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Deserialize};

use podwatch_types::{Labels, Namespace, PodUid};
use podwatch_types::defaults::POD_TEMPLATE_HASH_LABEL;

use crate::k8_types::{K8Obj, K8Watch};
use crate::k8_types::core::pod::PodSpec;
use crate::object::ObjectRef;

/// pod object as delivered by the cluster api
pub type RawPod = K8Obj<PodSpec>;

/// identity of a pod across events
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PodKey {
    pub namespace: Namespace,
    pub uid: PodUid,
}

impl PodKey {
    pub fn new(namespace: impl Into<Namespace>, uid: impl Into<PodUid>) -> Self {
        Self {
            namespace: namespace.into(),
            uid: uid.into(),
        }
    }

    pub fn of(pod: &RawPod) -> Self {
        Self::new(pod.metadata.namespace.clone(), pod.metadata.uid.clone())
    }
}

impl fmt::Display for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.uid)
    }
}

/// Result of walking a pod's owner chain
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OwnerSummary {
    /// pod has no owner references, e.g. applied by hand
    #[default]
    NoOwner,
    Resolved(ObjectRef),
    /// owner chain could not be walked, retried on next reconcile
    Unknown,
}

impl OwnerSummary {
    pub fn root(&self) -> Option<&ObjectRef> {
        match self {
            Self::Resolved(root) => Some(root),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Added,
    Modified,
    Deleted,
}

/// Single event from a namespace watch stream.
///
/// `resource_version` is the stream cursor; a watch resumed from it delivers
/// only later events.
#[derive(Debug, Clone)]
pub struct PodWatchEvent {
    pub kind: WatchEventKind,
    pub pod: RawPod,
    pub resource_version: String,
}

impl PodWatchEvent {
    pub fn new(kind: WatchEventKind, pod: RawPod) -> Self {
        let resource_version = pod.metadata.resource_version.clone();
        Self {
            kind,
            pod,
            resource_version,
        }
    }

    pub fn with_cursor(mut self, resource_version: impl Into<String>) -> Self {
        self.resource_version = resource_version.into();
        self
    }

    pub fn key(&self) -> PodKey {
        PodKey::of(&self.pod)
    }
}

impl From<K8Watch<PodSpec>> for PodWatchEvent {
    fn from(watch: K8Watch<PodSpec>) -> Self {
        match watch {
            K8Watch::ADDED(pod) => Self::new(WatchEventKind::Added, pod),
            K8Watch::MODIFIED(pod) => Self::new(WatchEventKind::Modified, pod),
            K8Watch::DELETED(pod) => Self::new(WatchEventKind::Deleted, pod),
        }
    }
}

/// Pod in the store's schema
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPod {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub resource_version: String,
    pub labels: BTreeMap<String, String>,
    pub pod_template_spec_hash: Option<String>,
    pub containers: Vec<String>,
    pub images: Vec<String>,
    pub owner: OwnerSummary,
    pub deleting: bool,
}

impl NormalizedPod {
    pub fn from_raw(pod: &RawPod, owner: &OwnerSummary, deleting: bool) -> Self {
        let meta = &pod.metadata;
        Self {
            name: meta.name.clone(),
            namespace: meta.namespace.clone(),
            uid: meta.uid.clone(),
            resource_version: meta.resource_version.clone(),
            labels: sorted_labels(&meta.labels),
            pod_template_spec_hash: meta.labels.get(POD_TEMPLATE_HASH_LABEL).cloned(),
            containers: pod
                .spec
                .containers
                .iter()
                .map(|container| container.name.clone())
                .collect(),
            images: pod
                .spec
                .containers
                .iter()
                .filter_map(|container| container.image.clone())
                .collect(),
            owner: owner.clone(),
            deleting: deleting || meta.deletion_timestamp.is_some(),
        }
    }
}

fn sorted_labels(labels: &Labels) -> BTreeMap<String, String> {
    labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
