use podwatch_model::{NormalizedPod, OwnerSummary, RawPod};

/// Converts a raw pod to the store's schema; must be free of side effects
pub trait PodNormalizer: Send + Sync {
    fn normalize(&self, pod: &RawPod, owner: &OwnerSummary, deleting: bool) -> NormalizedPod;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPodNormalizer;

impl PodNormalizer for DefaultPodNormalizer {
    fn normalize(&self, pod: &RawPod, owner: &OwnerSummary, deleting: bool) -> NormalizedPod {
        NormalizedPod::from_raw(pod, owner, deleting)
    }
}
