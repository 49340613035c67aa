use async_trait::async_trait;

use crate::bus::EventBus;
use crate::producer::LogProducer;
use tickflow_feed::{FeedEvent, Writer, WriterError};

/// Writer handing each received envelope to both delivery paths: the
/// in-process event bus and the durable log producer. The paths stay fully
/// independent — no shared ordering, no cross-path deduplication — so a
/// message may be processed twice, once per path.
pub struct FanoutWriter {
    bus: EventBus,
    producer: LogProducer,
}

impl FanoutWriter {
    pub fn new(bus: EventBus, producer: LogProducer) -> Self {
        Self { bus, producer }
    }
}

#[async_trait]
impl Writer for FanoutWriter {
    async fn write(&mut self, event: &FeedEvent) -> Result<(), WriterError> {
        self.bus.publish(event.clone());
        self.producer.publish(event);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), WriterError> {
        Ok(())
    }
}
