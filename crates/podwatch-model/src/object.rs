use std::fmt;

use serde::{Serialize, Deserialize};

use crate::k8_types::{ObjectMeta, OwnerReferences};

/// Reference to a cluster object, enough to identify it across events.
///
/// Two references denote the same object when both carry a uid and the uids
/// are equal. References built from configuration often lack a uid, in which
/// case kind, namespace and name must all agree.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub uid: String,
}

impl ObjectRef {
    pub fn new<S>(kind: S, namespace: S, name: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
            uid: String::new(),
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    /// owner references never carry a namespace, owners live next to their dependents
    pub fn from_owner(owner: &OwnerReferences, namespace: &str) -> Self {
        Self {
            kind: owner.kind.clone(),
            namespace: namespace.to_owned(),
            name: owner.name.clone(),
            uid: owner.uid.clone(),
        }
    }

    pub fn from_meta(kind: impl Into<String>, meta: &ObjectMeta) -> Self {
        Self {
            kind: kind.into(),
            namespace: meta.namespace.clone(),
            name: meta.name.clone(),
            uid: meta.uid.clone(),
        }
    }

    pub fn same_object(&self, other: &Self) -> bool {
        if !self.uid.is_empty() && !other.uid.is_empty() {
            return self.uid == other.uid;
        }
        self.kind == other.kind && self.namespace == other.namespace && self.name == other.name
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Pick the owner reference to follow: the controller if one is marked, else the first.
pub fn controller_owner(meta: &ObjectMeta) -> Option<&OwnerReferences> {
    meta.owner_references
        .iter()
        .find(|owner| owner.controller == Some(true))
        .or_else(|| meta.owner_references.first())
}
