use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use podwatch_model::{LabelSelector, ObjectRef, StoreSnapshot};
use podwatch_types::{Labels, ManifestName, Namespace};

/// Watch target derived from one live manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestWatchTarget {
    pub name: ManifestName,
    pub selectors: Vec<LabelSelector>,
    pub deployed_entities: Vec<ObjectRef>,
}

impl ManifestWatchTarget {
    pub fn owns(&self, root: &ObjectRef) -> bool {
        self.deployed_entities
            .iter()
            .any(|entity| entity.same_object(root))
    }

    pub fn selects(&self, labels: &Labels) -> bool {
        self.selectors.iter().any(|selector| selector.matches(labels))
    }
}

/// Live manifests keyed by name.
/// Iteration is lexicographic by manifest name, which fixes selector match priority.
#[derive(Debug, Default)]
pub struct ManifestTargetRegistry {
    targets: BTreeMap<ManifestName, ManifestWatchTarget>,
}

impl ManifestTargetRegistry {
    /// Replace every target with the contents of `snapshot`.
    /// Returns the names of manifests that are no longer live.
    pub fn rebuild(&mut self, snapshot: &StoreSnapshot) -> Vec<ManifestName> {
        let mut targets = BTreeMap::new();
        for manifest in &snapshot.manifests {
            if targets.contains_key(&manifest.name) {
                warn!(manifest = %manifest.name, "duplicate manifest in snapshot, keeping first");
                continue;
            }

            let selectors: Vec<LabelSelector> = manifest
                .extra_selectors
                .iter()
                .filter(|selector| {
                    if selector.is_empty() {
                        warn!(manifest = %manifest.name, "ignoring empty extra selector");
                        false
                    } else {
                        true
                    }
                })
                .cloned()
                .collect();

            targets.insert(
                manifest.name.clone(),
                ManifestWatchTarget {
                    name: manifest.name.clone(),
                    selectors,
                    deployed_entities: manifest.deployed_entities.clone(),
                },
            );
        }

        let removed: Vec<ManifestName> = self
            .targets
            .keys()
            .filter(|name| !targets.contains_key(*name))
            .cloned()
            .collect();

        debug!(
            live = targets.len(),
            removed = removed.len(),
            "rebuilt manifest registry"
        );
        self.targets = targets;
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ManifestWatchTarget> {
        self.targets.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestWatchTarget> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// namespaces holding deployed entities, plus the default namespace
    pub fn namespaces(&self, default_namespace: &str) -> BTreeSet<Namespace> {
        let mut namespaces = BTreeSet::new();
        namespaces.insert(default_namespace.to_owned());
        for target in self.targets.values() {
            for entity in &target.deployed_entities {
                if !entity.namespace.is_empty() {
                    namespaces.insert(entity.namespace.clone());
                }
            }
        }
        namespaces
    }
}

#[cfg(test)]
mod test {
    use podwatch_model::ManifestSnapshot;

    use super::*;

    fn snapshot(manifests: Vec<ManifestSnapshot>) -> StoreSnapshot {
        StoreSnapshot::new(manifests)
    }

    #[test]
    fn test_rebuild_replaces_selectors() {
        let mut registry = ManifestTargetRegistry::default();
        registry.rebuild(&snapshot(vec![
            ManifestSnapshot::new("a")
                .with_selectors(vec![LabelSelector::new_labels(vec![("foo", "bar")])]),
        ]));

        let removed = registry.rebuild(&snapshot(vec![
            ManifestSnapshot::new("a")
                .with_selectors(vec![LabelSelector::new_labels(vec![("baz", "quu")])]),
        ]));
        assert!(removed.is_empty());

        let target = registry.get("a").expect("a");
        assert_eq!(
            target.selectors,
            vec![LabelSelector::new_labels(vec![("baz", "quu")])]
        );
    }

    #[test]
    fn test_rebuild_reports_removed() {
        let mut registry = ManifestTargetRegistry::default();
        registry.rebuild(&snapshot(vec![
            ManifestSnapshot::new("a"),
            ManifestSnapshot::new("b"),
        ]));

        let removed = registry.rebuild(&snapshot(vec![
            ManifestSnapshot::new("b"),
            ManifestSnapshot::new("c"),
        ]));
        assert_eq!(removed, vec!["a".to_owned()]);
        assert!(!registry.contains("a"));
        assert!(registry.contains("c"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_iteration_is_lexicographic() {
        let mut registry = ManifestTargetRegistry::default();
        registry.rebuild(&snapshot(vec![
            ManifestSnapshot::new("zeta"),
            ManifestSnapshot::new("alpha"),
            ManifestSnapshot::new("mid"),
        ]));

        let names: Vec<&str> = registry.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_empty_selector_dropped() {
        let mut registry = ManifestTargetRegistry::default();
        registry.rebuild(&snapshot(vec![
            ManifestSnapshot::new("a").with_selectors(vec![LabelSelector::default()]),
        ]));

        let target = registry.get("a").expect("a");
        assert!(target.selectors.is_empty());
        assert!(!target.selects(&Labels::new()));
    }

    #[test]
    fn test_namespaces() {
        let mut registry = ManifestTargetRegistry::default();
        registry.rebuild(&snapshot(vec![
            ManifestSnapshot::new("a").with_deployed_entities(vec![
                ObjectRef::new("Deployment", "dev", "a"),
                ObjectRef::new("Service", "", "a"),
            ]),
            ManifestSnapshot::new("b")
                .with_deployed_entities(vec![ObjectRef::new("Deployment", "prod", "b")]),
        ]));

        let namespaces: Vec<String> = registry.namespaces("default").into_iter().collect();
        assert_eq!(namespaces, vec!["default", "dev", "prod"]);
    }
}
