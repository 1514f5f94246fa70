//! Builders for pods and their owner trees, shared by tests.

use std::collections::HashMap;

use crate::k8_types::{K8Obj, ObjectMeta, OwnerReferences};
use crate::k8_types::core::pod::{PodSpec, ContainerSpec};
use crate::object::ObjectRef;
use crate::pod::RawPod;

pub const DEPLOYMENT_KIND: &str = "Deployment";
pub const REPLICA_SET_KIND: &str = "ReplicaSet";

/// Builds a pod owned by a replica set which is owned by a deployment,
/// the shape a deployment controller produces.
#[derive(Debug, Clone)]
pub struct PodBuilder {
    manifest: String,
    pod_id: String,
    namespace: String,
    resource_version: String,
    labels: Vec<(String, String)>,
    owner: PodOwner,
    deleting: bool,
}

#[derive(Debug, Clone)]
enum PodOwner {
    ReplicaSet,
    Unresolvable,
    None,
}

impl PodBuilder {
    pub fn new(manifest: impl Into<String>) -> Self {
        let manifest = manifest.into();
        Self {
            pod_id: format!("{manifest}-pod"),
            manifest,
            namespace: "default".to_owned(),
            resource_version: "1".to_owned(),
            labels: vec![],
            owner: PodOwner::ReplicaSet,
            deleting: false,
        }
    }

    pub fn with_pod_id(mut self, pod_id: impl Into<String>) -> Self {
        self.pod_id = pod_id.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_resource_version(mut self, version: impl Into<String>) -> Self {
        self.resource_version = version.into();
        self
    }

    pub fn with_pod_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    pub fn with_template_spec_hash(self, hash: impl Into<String>) -> Self {
        self.with_pod_label(podwatch_types::defaults::POD_TEMPLATE_HASH_LABEL, hash)
    }

    /// owner reference points at an object the cluster does not know
    pub fn with_unknown_owner(mut self) -> Self {
        self.owner = PodOwner::Unresolvable;
        self
    }

    pub fn without_owner(mut self) -> Self {
        self.owner = PodOwner::None;
        self
    }

    pub fn deleting(mut self) -> Self {
        self.deleting = true;
        self
    }

    pub fn uid(&self) -> String {
        format!("{}-uid", self.pod_id)
    }

    pub fn deployment_ref(&self) -> ObjectRef {
        ObjectRef::from_meta(DEPLOYMENT_KIND, &self.deployment_meta())
    }

    /// (kind, metadata) of every object above the pod, root first
    pub fn object_tree(&self) -> Vec<(String, ObjectMeta)> {
        vec![
            (DEPLOYMENT_KIND.to_owned(), self.deployment_meta()),
            (REPLICA_SET_KIND.to_owned(), self.replica_set_meta()),
        ]
    }

    fn deployment_meta(&self) -> ObjectMeta {
        ObjectMeta {
            name: self.manifest.clone(),
            namespace: self.namespace.clone(),
            uid: format!("{}-deployment-uid", self.manifest),
            ..Default::default()
        }
    }

    fn replica_set_meta(&self) -> ObjectMeta {
        let deployment = self.deployment_meta();
        ObjectMeta {
            name: format!("{}-rs", self.manifest),
            namespace: self.namespace.clone(),
            uid: format!("{}-rs-uid", self.manifest),
            owner_references: vec![OwnerReferences {
                kind: DEPLOYMENT_KIND.to_owned(),
                name: deployment.name,
                uid: deployment.uid,
                controller: Some(true),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    pub fn build(&self) -> RawPod {
        let spec = PodSpec {
            containers: vec![ContainerSpec {
                name: self.manifest.clone(),
                image: Some(format!("{}:latest", self.manifest)),
                ..Default::default()
            }],
            ..Default::default()
        };

        let mut labels: HashMap<String, String> = HashMap::new();
        labels.insert("app".to_owned(), self.manifest.clone());
        for (key, value) in &self.labels {
            labels.insert(key.clone(), value.clone());
        }

        let owner_references = match self.owner {
            PodOwner::ReplicaSet => {
                let rs = self.replica_set_meta();
                vec![OwnerReferences {
                    kind: REPLICA_SET_KIND.to_owned(),
                    name: rs.name,
                    uid: rs.uid,
                    controller: Some(true),
                    ..Default::default()
                }]
            }
            PodOwner::Unresolvable => vec![OwnerReferences {
                kind: REPLICA_SET_KIND.to_owned(),
                name: format!("{}-missing-rs", self.pod_id),
                uid: format!("{}-missing-rs-uid", self.pod_id),
                controller: Some(true),
                ..Default::default()
            }],
            PodOwner::None => vec![],
        };

        let mut pod: RawPod = K8Obj::new(self.pod_id.clone(), spec);
        pod.metadata = ObjectMeta {
            name: self.pod_id.clone(),
            namespace: self.namespace.clone(),
            uid: self.uid(),
            resource_version: self.resource_version.clone(),
            labels,
            owner_references,
            deletion_timestamp: self.deleting.then(|| "2024-01-01T00:00:00Z".to_owned()),
            ..Default::default()
        };
        pod
    }
}
