use super::{Delivery, DeliveryError, MessageTransport, OutgoingMessage, REALTIME_ACK_TIMEOUT};
use futures::future::BoxFuture;
use std::sync::Arc;

/// Races the primary transport against [`REALTIME_ACK_TIMEOUT`] and hands the
/// message to the fallback transport when the primary fails or is too slow.
///
/// Once the fallback starts, the primary attempt is dropped; a late
/// acknowledgement is left to the caller's idempotent reconciliation.
/// The fallback is tried once; its failure is final.
#[derive(Clone)]
pub struct FallbackTransport {
    primary: Arc<dyn MessageTransport>,
    fallback: Arc<dyn MessageTransport>,
}

impl FallbackTransport {
    /// Compose `primary` (usually realtime) with `fallback` (usually reliable)
    #[must_use]
    pub fn new(primary: Arc<dyn MessageTransport>, fallback: Arc<dyn MessageTransport>) -> Self {
        Self { primary, fallback }
    }
}

impl MessageTransport for FallbackTransport {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn deliver<'a>(
        &'a self,
        message: &'a OutgoingMessage,
    ) -> BoxFuture<'a, Result<Delivery, DeliveryError>> {
        Box::pin(async move {
            let reason =
                match tokio::time::timeout(REALTIME_ACK_TIMEOUT, self.primary.deliver(message))
                    .await
                {
                    Ok(Ok(delivery)) => {
                        metrics::counter!("delivery.route", "route" => delivery.route.as_str())
                            .increment(1);
                        return Ok(delivery);
                    },
                    Ok(Err(error)) => error,
                    Err(_) => DeliveryError::Timeout(REALTIME_ACK_TIMEOUT),
                };

            tracing::info!(
                temporary_id = %message.temporary_id,
                primary = self.primary.name(),
                fallback = self.fallback.name(),
                %reason,
                "Primary transport gave up, falling back"
            );

            match self.fallback.deliver(message).await {
                Ok(delivery) => {
                    metrics::counter!("delivery.route", "route" => delivery.route.as_str())
                        .increment(1);
                    Ok(delivery)
                },
                Err(error) => {
                    metrics::counter!("delivery.failed").increment(1);
                    tracing::warn!(
                        temporary_id = %message.temporary_id,
                        %error,
                        "Message delivery failed"
                    );
                    Err(error)
                },
            }
        })
    }
}
