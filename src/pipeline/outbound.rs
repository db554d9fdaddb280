use tracing::{error, info, warn};
use wa_relay_core::{
    Message, MessageKind, MessageProps, RelayError, RelayResult, SELF_SENDER, SaveOutcome,
};

use super::MessageService;

/// An outbound text. `tenant_id` must come from an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub recipient: String,
    pub content: String,
    pub tenant_id: String,
}

impl MessageService {
    /// Send through the provider, then record the message under the
    /// provider's id. Nothing is stored when the provider call fails.
    pub async fn send(&self, request: SendRequest) -> RelayResult<Message> {
        if request.tenant_id.trim().is_empty() {
            return Err(RelayError::InvalidDomainState(
                "send requires a tenant id".into(),
            ));
        }
        if request.recipient.trim().is_empty() {
            return Err(RelayError::Validation("recipient must not be empty".into()));
        }
        if request.content.trim().is_empty() {
            return Err(RelayError::Validation("content must not be empty".into()));
        }

        let receipt = match self
            .provider
            .send_text(&request.recipient, &request.content)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                metrics::counter!("relay_outbound_total", "outcome" => "provider_error")
                    .increment(1);
                warn!(
                    "{} send to {} failed for tenant {}: {}",
                    self.provider.name(),
                    request.recipient,
                    request.tenant_id,
                    e
                );
                return Err(e);
            }
        };
        let provider_message_id = receipt.provider_message_id;

        let recorded = Message::create(
            MessageProps {
                sender: SELF_SENDER.to_string(),
                recipient: Some(request.recipient.clone()),
                content: request.content,
                kind: MessageKind::Text,
                timestamp: None,
                external_id: provider_message_id.clone(),
                tenant_id: request.tenant_id.clone(),
                is_outbound: true,
                has_media: Some(false),
                created_at: None,
            },
            None,
        );
        let message = match recorded {
            Ok(m) => m,
            Err(e) => return Err(unrecorded(&provider_message_id, &request.tenant_id, &e)),
        };

        match self.repository.save(&message).await {
            Ok(SaveOutcome::Inserted) => {
                metrics::counter!("relay_outbound_total", "outcome" => "sent").increment(1);
                info!(
                    "sent message {} to {} for tenant {}",
                    provider_message_id, request.recipient, request.tenant_id
                );
                Ok(message)
            }
            Ok(SaveOutcome::Duplicate) => {
                metrics::counter!("relay_outbound_total", "outcome" => "sent").increment(1);
                warn!(
                    "provider id {} already recorded for tenant {}",
                    provider_message_id, request.tenant_id
                );
                Ok(message)
            }
            Err(e) => Err(unrecorded(&provider_message_id, &request.tenant_id, &e)),
        }
    }
}

fn unrecorded(provider_message_id: &str, tenant_id: &str, e: &RelayError) -> RelayError {
    metrics::counter!("relay_outbound_total", "outcome" => "unrecorded").increment(1);
    error!(
        critical = true,
        provider_message_id = %provider_message_id,
        tenant = %tenant_id,
        "message sent but not recorded: {}",
        e
    );
    RelayError::SentNotRecorded {
        provider_message_id: provider_message_id.to_string(),
        reason: e.to_string(),
    }
}
