use serde::Serialize;

use podwatch_types::ManifestName;

use crate::pod::NormalizedPod;

/// Pod update forwarded to the store for one manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodChangeAction {
    pub manifest_name: ManifestName,
    pub pod: NormalizedPod,
}

impl PodChangeAction {
    pub fn new(manifest_name: impl Into<ManifestName>, pod: NormalizedPod) -> Self {
        Self {
            manifest_name: manifest_name.into(),
            pod,
        }
    }
}
