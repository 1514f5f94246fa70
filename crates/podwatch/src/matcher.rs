use podwatch_model::OwnerSummary;
use podwatch_types::Labels;

use crate::registry::ManifestTargetRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Owner,
    Selector,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodMatch<'a> {
    pub manifest: &'a str,
    pub kind: MatchKind,
}

/// Find the manifest a pod belongs to.
///
/// A pod whose root owner is a deployed entity of some manifest belongs to that
/// manifest regardless of labels. Otherwise manifests are tried in name order and
/// the first whose extra selectors match the pod labels wins.
pub fn match_pod<'a>(
    registry: &'a ManifestTargetRegistry,
    owner: &OwnerSummary,
    labels: &Labels,
) -> Option<PodMatch<'a>> {
    if let Some(root) = owner.root() {
        if let Some(target) = registry.iter().find(|target| target.owns(root)) {
            return Some(PodMatch {
                manifest: &target.name,
                kind: MatchKind::Owner,
            });
        }
    }

    registry
        .iter()
        .find(|target| target.selects(labels))
        .map(|target| PodMatch {
            manifest: &target.name,
            kind: MatchKind::Selector,
        })
}
