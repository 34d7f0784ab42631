use super::{Delivery, DeliveryError, MessageTransport, OutgoingMessage, Route};
use crate::api::MessageApi;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Creates messages through [`MessageApi::create_message`]
#[derive(Clone)]
pub struct ReliableTransport {
    api: Arc<dyn MessageApi>,
}

impl ReliableTransport {
    /// Transport over `api`
    #[must_use]
    pub fn new(api: Arc<dyn MessageApi>) -> Self {
        Self { api }
    }
}

impl MessageTransport for ReliableTransport {
    fn name(&self) -> &'static str {
        "reliable"
    }

    fn deliver<'a>(
        &'a self,
        message: &'a OutgoingMessage,
    ) -> BoxFuture<'a, Result<Delivery, DeliveryError>> {
        Box::pin(async move {
            let permanent = self.api.create_message(message).await?;
            Ok(Delivery {
                message: permanent,
                route: Route::Reliable,
            })
        })
    }
}
