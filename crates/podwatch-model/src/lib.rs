pub mod object;
pub mod selector;
pub mod version;
pub mod pod;
pub mod manifest;
pub mod action;

// re-export k8-types crate
pub use k8_types;

pub use object::ObjectRef;
pub use selector::LabelSelector;
pub use version::ResourceVersion;
pub use pod::{RawPod, PodKey, OwnerSummary, NormalizedPod, PodWatchEvent, WatchEventKind};
pub use manifest::{ManifestSnapshot, StoreSnapshot, SnapshotSource};
pub use action::PodChangeAction;

#[cfg(any(test, feature = "fixture"))]
pub mod fixture;
