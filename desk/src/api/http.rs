//! HTTP implementation of the backend contract.

use super::{
    ApiEnvelope, ApiResult, EscalationReceipt, EscalationRequest, MessageApi, NewTicket,
    SupportApi,
};
use crate::config::DeskConfig;
use crate::delivery::OutgoingMessage;
use crate::error::ApiError;
use crate::types::{ConversationId, Message, MessageStatus, Note, Ticket, TicketAnalytics, TicketId};
use futures::future::BoxFuture;
use reqwest::{header, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;

/// reqwest client for the support backend
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    /// Build a client from configuration
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the TLS backend cannot be initialised.
    pub fn new(config: &DeskConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.api_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
        })
    }

    /// Backend base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(header::AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    /// Send a request and decode the envelope
    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        self.envelope(request).await?.into_result()
    }

    /// Send a request and only check `success`
    async fn call_unit(&self, request: RequestBuilder) -> ApiResult<()> {
        self.envelope::<serde_json::Value>(request).await?.into_unit()
    }

    async fn envelope<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<ApiEnvelope<T>> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ApiEnvelope<serde_json::Value>>(&body)
                .ok()
                .and_then(|envelope| envelope.message)
                .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
            tracing::warn!(status = status.as_u16(), %message, "Backend returned an error status");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

impl SupportApi for HttpBackend {
    fn create_ticket<'a>(&'a self, ticket: &'a NewTicket) -> BoxFuture<'a, ApiResult<Ticket>> {
        Box::pin(async move {
            self.call(self.client.post(self.url("/support/tickets")).json(ticket))
                .await
        })
    }

    fn list_pending(&self) -> BoxFuture<'_, ApiResult<Vec<Ticket>>> {
        Box::pin(async move {
            self.call(self.client.get(self.url("/support/tickets/pending")))
                .await
        })
    }

    fn list_assigned<'a>(&'a self, agent_id: &'a str) -> BoxFuture<'a, ApiResult<Vec<Ticket>>> {
        Box::pin(async move {
            self.call(
                self.client
                    .get(self.url("/support/tickets/assigned"))
                    .query(&[("agentId", agent_id)]),
            )
            .await
        })
    }

    fn get_ticket<'a>(&'a self, ticket_id: &'a TicketId) -> BoxFuture<'a, ApiResult<Ticket>> {
        Box::pin(async move {
            self.call(self.client.get(self.url(&format!("/support/tickets/{ticket_id}"))))
                .await
        })
    }

    fn assign_ticket<'a>(
        &'a self,
        ticket_id: &'a TicketId,
        agent_id: &'a str,
    ) -> BoxFuture<'a, ApiResult<Ticket>> {
        Box::pin(async move {
            self.call(
                self.client
                    .put(self.url(&format!("/support/tickets/{ticket_id}/assign")))
                    .json(&json!({ "agentId": agent_id })),
            )
            .await
        })
    }

    fn resolve_ticket<'a>(
        &'a self,
        ticket_id: &'a TicketId,
        agent_id: &'a str,
        resolution: &'a str,
    ) -> BoxFuture<'a, ApiResult<Ticket>> {
        Box::pin(async move {
            self.call(
                self.client
                    .put(self.url(&format!("/support/tickets/{ticket_id}/resolve")))
                    .json(&json!({ "agentId": agent_id, "resolution": resolution })),
            )
            .await
        })
    }

    fn add_note<'a>(
        &'a self,
        ticket_id: &'a TicketId,
        content: &'a str,
    ) -> BoxFuture<'a, ApiResult<Note>> {
        Box::pin(async move {
            self.call(
                self.client
                    .post(self.url(&format!("/support/tickets/{ticket_id}/notes")))
                    .json(&json!({ "content": content })),
            )
            .await
        })
    }

    fn close_ticket<'a>(&'a self, ticket_id: &'a TicketId) -> BoxFuture<'a, ApiResult<Ticket>> {
        Box::pin(async move {
            self.call(
                self.client
                    .put(self.url(&format!("/support/tickets/{ticket_id}/close"))),
            )
            .await
        })
    }

    fn analytics(&self) -> BoxFuture<'_, ApiResult<TicketAnalytics>> {
        Box::pin(async move { self.call(self.client.get(self.url("/support/analytics"))).await })
    }

    fn request_escalation<'a>(
        &'a self,
        request: &'a EscalationRequest,
    ) -> BoxFuture<'a, ApiResult<EscalationReceipt>> {
        Box::pin(async move {
            self.call(self.client.post(self.url("/support/escalations")).json(request))
                .await
        })
    }
}

impl MessageApi for HttpBackend {
    fn create_message<'a>(
        &'a self,
        message: &'a OutgoingMessage,
    ) -> BoxFuture<'a, ApiResult<Message>> {
        Box::pin(async move {
            self.call(self.client.post(self.url("/messages")).json(message))
                .await
        })
    }

    fn list_messages<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, ApiResult<Vec<Message>>> {
        Box::pin(async move {
            self.call(
                self.client
                    .get(self.url(&format!("/messages/conversations/{conversation_id}"))),
            )
            .await
        })
    }

    fn mark_read<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        reader: &'a str,
    ) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            self.call_unit(
                self.client
                    .put(self.url(&format!("/messages/conversations/{conversation_id}/read")))
                    .json(&json!({ "userId": reader })),
            )
            .await
        })
    }

    fn update_status<'a>(
        &'a self,
        message_id: &'a str,
        status: &'a MessageStatus,
    ) -> BoxFuture<'a, ApiResult<Message>> {
        Box::pin(async move {
            self.call(
                self.client
                    .put(self.url(&format!("/messages/{message_id}/status")))
                    .json(status),
            )
            .await
        })
    }

    fn delete_message<'a>(&'a self, message_id: &'a str) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            self.call_unit(self.client.delete(self.url(&format!("/messages/{message_id}"))))
                .await
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builds_urls_without_double_slash() {
        let config = DeskConfig {
            api_url: "https://desk.example.com/api/".to_string(),
            ..DeskConfig::default()
        };
        let backend = HttpBackend::new(&config).unwrap();

        assert_eq!(backend.base_url(), "https://desk.example.com/api");
        assert_eq!(
            backend.url("/support/tickets/pending"),
            "https://desk.example.com/api/support/tickets/pending"
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let config = DeskConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            api_timeout_secs: 1,
            ..DeskConfig::default()
        };
        let backend = HttpBackend::new(&config).unwrap();

        let error = backend.list_pending().await.unwrap_err();

        assert!(matches!(error, ApiError::Transport(_)));
        assert!(error.is_transient());
    }
}
