use serde::{Serialize, Deserialize};

use podwatch_types::ManifestName;

use crate::object::ObjectRef;
use crate::selector::LabelSelector;

/// What the store knows about one live manifest
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSnapshot {
    pub name: ManifestName,
    /// selectors declared in the manifest config, in declaration order
    #[serde(default)]
    pub extra_selectors: Vec<LabelSelector>,
    /// objects deployed for this manifest, taken from runtime state
    #[serde(default)]
    pub deployed_entities: Vec<ObjectRef>,
}

impl ManifestSnapshot {
    pub fn new(name: impl Into<ManifestName>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_selectors(mut self, selectors: Vec<LabelSelector>) -> Self {
        self.extra_selectors = selectors;
        self
    }

    pub fn with_deployed_entities(mut self, entities: Vec<ObjectRef>) -> Self {
        self.deployed_entities = entities;
        self
    }
}

/// Read only view of the store's live manifests
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub manifests: Vec<ManifestSnapshot>,
}

impl StoreSnapshot {
    pub fn new(manifests: Vec<ManifestSnapshot>) -> Self {
        Self { manifests }
    }

    pub fn manifest(&self, name: &str) -> Option<&ManifestSnapshot> {
        self.manifests.iter().find(|m| m.name == name)
    }
}

/// Accessor for the store state.
/// Implementations must not hold store locks beyond taking the snapshot.
pub trait SnapshotSource {
    fn manifest_snapshot(&self) -> StoreSnapshot;
}

impl SnapshotSource for StoreSnapshot {
    fn manifest_snapshot(&self) -> StoreSnapshot {
        self.clone()
    }
}
