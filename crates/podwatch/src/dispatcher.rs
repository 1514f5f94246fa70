use async_channel::{Sender, TrySendError};
use tracing::{error, trace};

use podwatch_model::PodChangeAction;

/// Receiver of pod actions. `dispatch` must only enqueue, never wait on the store.
pub trait ActionSink: Send + Sync {
    fn dispatch(&self, action: PodChangeAction);
}

/// Channel backed sink. Use an unbounded channel: a full bounded channel drops actions.
impl ActionSink for Sender<PodChangeAction> {
    fn dispatch(&self, action: PodChangeAction) {
        trace!(manifest = %action.manifest_name, pod = %action.pod.name, "dispatching pod");
        match self.try_send(action) {
            Ok(()) => {}
            Err(TrySendError::Full(action)) => {
                error!(manifest = %action.manifest_name, pod = %action.pod.name, "action sink full, dropping pod update");
            }
            Err(TrySendError::Closed(action)) => {
                trace!(manifest = %action.manifest_name, "action sink closed");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use podwatch_model::NormalizedPod;

    use super::*;

    #[test]
    fn test_channel_sink_preserves_order() {
        let (sender, receiver) = async_channel::unbounded();
        for version in ["1", "2", "3"] {
            sender.dispatch(PodChangeAction::new(
                "m",
                NormalizedPod {
                    resource_version: version.to_owned(),
                    ..Default::default()
                },
            ));
        }

        let versions: Vec<String> = std::iter::from_fn(|| receiver.try_recv().ok())
            .map(|action| action.pod.resource_version)
            .collect();
        assert_eq!(versions, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_closed_sink_does_not_panic() {
        let (sender, receiver) = async_channel::unbounded::<PodChangeAction>();
        drop(receiver);
        sender.dispatch(PodChangeAction::new("m", NormalizedPod::default()));
    }
}
