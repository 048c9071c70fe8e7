//! Producer-side integration gateway.
//!
//! The gateway is an ordinary subscription handler: it runs the context's
//! [`IntegrationTransform`] over every recorded event and publishes whatever
//! crosses the boundary. Because it sits inside a subscription lane, a failed
//! publish keeps the event un-checkpointed and it is retried like any other
//! handler failure: possibly publishing twice, never losing a message.

use roomline_core::event::RecordedEvent;
use roomline_core::event_bus::EventBus;
use roomline_core::handler::{EventHandler, HandlerError};
use roomline_core::integration::IntegrationTransform;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Publishes transformed domain events to a broker topic.
pub struct IntegrationGateway {
    name: &'static str,
    transform: Arc<dyn IntegrationTransform>,
    bus: Arc<dyn EventBus>,
    topic: String,
}

impl IntegrationGateway {
    /// Create a gateway publishing to `topic`.
    #[must_use]
    pub fn new(
        name: &'static str,
        transform: Arc<dyn IntegrationTransform>,
        bus: Arc<dyn EventBus>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            name,
            transform,
            bus,
            topic: topic.into(),
        }
    }
}

impl EventHandler for IntegrationGateway {
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle<'a>(
        &'a self,
        event: &'a RecordedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            let integration = self
                .transform
                .transform(event)
                .map_err(|error| HandlerError::Poison(error.to_string()))?;
            let Some(integration) = integration else {
                // This event type does not cross the boundary.
                return Ok(());
            };

            // Keyed by stream id so one aggregate's messages stay ordered on
            // a partitioned topic.
            self.bus
                .publish(&self.topic, event.stream_id.as_str(), &integration)
                .await
                .map_err(|error| HandlerError::Transient(error.to_string()))?;
            tracing::debug!(
                topic = %self.topic,
                event_type = %integration.event_type,
                causation_id = %integration.causation_id,
                "integration event published"
            );
            Ok(())
        })
    }
}
