//! Notification seam.
//!
//! Delivery is someone else's job: the workflow hands over an event after the
//! write has landed and never waits on, or fails because of, the outcome.
use crate::repository::Collection;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEvent {
    pub collection: Collection,
    pub entity_id: String,
    pub owner_id: String,
    pub status: &'static str,
    pub changed_by: String,
    pub observations: String,
}

/// Receives transition events.
///
/// `notify` runs on the transition's call path, so implementations must only
/// hand the event off (enqueue it, push it onto a channel) and return. Actual
/// delivery happens elsewhere. [`ChannelNotifier`] is the stock way to do it.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &TransitionEvent) -> anyhow::Result<()>;
}

/// Drops every event.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: &TransitionEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Pushes events onto an unbounded channel; the consumer drains it at its own
/// pace. Sending never blocks.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<TransitionEvent>,
}

impl ChannelNotifier {
    pub fn new(sender: mpsc::UnboundedSender<TransitionEvent>) -> Self {
        Self { sender }
    }

    /// A notifier together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransitionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: &TransitionEvent) -> anyhow::Result<()> {
        self.sender
            .send(event.clone())
            .map_err(|_| anyhow::anyhow!("notification receiver dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> TransitionEvent {
        TransitionEvent {
            collection: Collection::Advances,
            entity_id: "advance_1".into(),
            owner_id: "op-1".into(),
            status: "PAGAMENTO_EFETUADO",
            changed_by: "bruno".into(),
            observations: "TED".into(),
        }
    }

    #[test]
    fn channel_notifier_enqueues_without_a_consumer_running() {
        let (notifier, mut receiver) = ChannelNotifier::channel();
        notifier.notify(&event()).unwrap();
        notifier.notify(&event()).unwrap();

        assert_eq!(receiver.try_recv().unwrap(), event());
        assert_eq!(receiver.try_recv().unwrap(), event());
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_is_reported() {
        let (notifier, receiver) = ChannelNotifier::channel();
        drop(receiver);
        assert!(notifier.notify(&event()).is_err());
    }
}
