use std::collections::HashMap;

use tracing::trace;

use podwatch_model::ResourceVersion;
use podwatch_types::{ManifestName, PodUid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    Drop,
}

/// What was dispatched for one (manifest, pod uid) pair
#[derive(Debug, Clone, PartialEq, Eq)]
struct Dispatched {
    /// highest numeric version dispatched, survives opaque versions in between
    high_water: Option<ResourceVersion>,
    last: ResourceVersion,
}

/// Last dispatched resource version per (manifest, pod uid).
///
/// Nothing numeric is admitted for a pair at or below the highest numeric
/// version it dispatched. Opaque versions are always admitted and leave that
/// mark in place. Entries are dropped together with their manifest so a
/// re-added manifest starts empty.
#[derive(Debug, Default)]
pub struct DispatchMemory {
    entries: HashMap<ManifestName, HashMap<PodUid, Dispatched>>,
}

impl DispatchMemory {
    /// check and set: records `version` when admitted
    pub fn admit(&mut self, manifest: &str, uid: &str, version: &str) -> Admission {
        let incoming = ResourceVersion::parse(version);
        let pods = self.entries.entry(manifest.to_owned()).or_default();

        let high_water = pods.get(uid).and_then(|dispatched| dispatched.high_water.clone());
        if let Some(mark) = &high_water {
            if !incoming.is_newer_than(mark) {
                trace!(manifest, uid, %incoming, %mark, "dropping stale pod version");
                return Admission::Drop;
            }
        }

        let high_water = match incoming {
            ResourceVersion::Numeric(_) => Some(incoming.clone()),
            ResourceVersion::Opaque(_) => high_water,
        };
        pods.insert(
            uid.to_owned(),
            Dispatched {
                high_water,
                last: incoming,
            },
        );
        Admission::Accept
    }

    pub fn last_dispatched(&self, manifest: &str, uid: &str) -> Option<&ResourceVersion> {
        self.entries
            .get(manifest)
            .and_then(|pods| pods.get(uid))
            .map(|dispatched| &dispatched.last)
    }

    pub fn purge_manifest(&mut self, manifest: &str) {
        self.entries.remove(manifest);
    }

    pub fn forget_pod(&mut self, uid: &str) {
        for pods in self.entries.values_mut() {
            pods.remove(uid);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|pods| pods.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
