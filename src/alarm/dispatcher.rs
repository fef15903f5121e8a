// src/alarm/dispatcher.rs
use std::sync::Arc;

use metrics::counter;

use crate::error::DeliveryError;
use crate::notify::discord::ChannelTransport;
use crate::sources::{EventPayload, SourceAdapter};

/// Outcome of dispatching one payload. `Skipped` means the adapter's
/// formatter produced nothing for this item; that is not a failure.
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Skipped,
}

/// Converts a payload into a channel-ready message and transmits it.
/// One payload per call; the scheduler catches `DeliveryError` per item so
/// a rejected message never aborts the rest of the batch.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn ChannelTransport>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn ChannelTransport>) -> Self {
        Self { transport }
    }

    pub async fn dispatch(
        &self,
        adapter: &dyn SourceAdapter,
        payload: &EventPayload,
    ) -> Result<DispatchOutcome, DeliveryError> {
        let Some(message) = adapter.format(payload) else {
            tracing::info!(
                source = adapter.name(),
                id = %payload.id,
                "formatter produced no message, skipping item"
            );
            counter!("alarm_format_skipped_total", "source" => adapter.name()).increment(1);
            return Ok(DispatchOutcome::Skipped);
        };

        self.transport
            .send(&adapter.options().channel_id, &message)
            .await?;
        counter!("alarm_dispatched_total", "source" => adapter.name()).increment(1);
        Ok(DispatchOutcome::Sent)
    }
}
