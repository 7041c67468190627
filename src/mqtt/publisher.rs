/// Pushing mapped readings onto the bus
use log::{debug, info, warn};

use crate::mqtt::bus::MessageBus;
use crate::mqtt::topics::TopicValue;

/// Counts from one publish pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub sent: usize,
    pub dropped: usize,
}

pub struct Publisher<B> {
    bus: B,
}

impl<B: MessageBus> Publisher<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Publish every pair while the bus reports itself connected
    ///
    /// Pairs that meet a disconnected bus are dropped rather than queued, and
    /// a failed publish only drops that pair. Neither is an error for the
    /// caller.
    pub async fn publish_all(&self, pairs: &[TopicValue]) -> PublishSummary {
        let mut summary = PublishSummary::default();

        if self.bus.is_connected() {
            info!("Publishing device data via mqtt");
        }

        for (topic, value) in pairs {
            if !self.bus.is_connected() {
                summary.dropped += 1;
                continue;
            }
            match self.bus.publish(topic, value.clone()).await {
                Ok(()) => {
                    debug!("{} = {}", topic, value);
                    summary.sent += 1;
                }
                Err(e) => {
                    warn!("Failed to publish {}: {}", topic, e);
                    summary.dropped += 1;
                }
            }
        }

        if summary.dropped > 0 {
            warn!(
                "Dropped {} of {} values this cycle",
                summary.dropped,
                pairs.len()
            );
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::bus::testing::RecordingBus;

    fn pairs() -> Vec<TopicValue> {
        vec![
            ("netatmo/AABBCC/type".into(), "NAMain".into()),
            ("netatmo/AABBCC/Temperature".into(), "21.5".into()),
        ]
    }

    #[tokio::test]
    async fn connected_bus_receives_all_pairs_in_order() {
        let bus = RecordingBus::connected();
        let publisher = Publisher::new(bus.clone());

        let summary = publisher.publish_all(&pairs()).await;

        assert_eq!(summary, PublishSummary { sent: 2, dropped: 0 });
        assert_eq!(bus.published(), pairs());
    }

    #[tokio::test]
    async fn disconnected_bus_drops_everything_without_error() {
        let bus = RecordingBus::disconnected();
        let publisher = Publisher::new(bus.clone());

        let summary = publisher.publish_all(&pairs()).await;

        assert_eq!(summary, PublishSummary { sent: 0, dropped: 2 });
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn empty_reading_publishes_nothing() {
        let bus = RecordingBus::connected();
        let summary = Publisher::new(bus.clone()).publish_all(&[]).await;

        assert_eq!(summary, PublishSummary::default());
        assert!(bus.published().is_empty());
    }
}
