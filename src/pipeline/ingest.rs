use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use wa_relay_core::{
    IngestFailure, IngestStage, Message, MessageKind, MessageProps, SaveOutcome,
    timestamp_from_unix_secs,
};

use super::{IngestOutcome, MessageService};
use crate::webhook::{InboundEvent, parse_events};

fn default_type() -> String {
    "text".to_string()
}

/// Pre-normalized inbound message from trusted automation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub sender: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_type", rename = "type")]
    pub kind: String,
    /// Unix seconds.
    #[serde(default, rename = "timestampUnixSeconds", alias = "timestamp")]
    pub timestamp: Option<i64>,
    pub external_id: String,
    pub tenant_id: String,
}

/// Fields of an inbound message once its tenant is known.
struct Candidate {
    tenant_id: String,
    external_id: String,
    sender: String,
    content: String,
    kind: MessageKind,
    timestamp: Option<DateTime<Utc>>,
}

impl Candidate {
    /// Normalized form kept in the failure log so the event can be replayed
    /// through `/webhook/inbound`.
    fn replay_payload(&self) -> String {
        serde_json::json!({
            "sender": self.sender,
            "content": self.content,
            "type": self.kind.as_str(),
            "timestampUnixSeconds": self.timestamp.map(|t| t.timestamp()),
            "externalId": self.external_id,
            "tenantId": self.tenant_id,
        })
        .to_string()
    }

    fn failure(&self, stage: IngestStage, error: String) -> IngestFailure {
        IngestFailure {
            stage,
            tenant_id: Some(self.tenant_id.clone()),
            external_id: Some(self.external_id.clone()),
            error,
            payload: Some(self.replay_payload()),
        }
    }
}

impl MessageService {
    /// Ingest a raw provider notification. Every event in the batch is
    /// processed independently.
    pub async fn ingest_payload(&self, body: &[u8]) -> Vec<IngestOutcome> {
        let events = parse_events(body);
        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            outcomes.push(self.ingest_event(event).await);
        }
        outcomes
    }

    pub async fn ingest_event(&self, event: InboundEvent) -> IngestOutcome {
        let message = match event {
            InboundEvent::Text(m) | InboundEvent::Media(m) => m,
            InboundEvent::StatusUpdate {
                external_id,
                status,
            } => {
                debug!("status update {} for {}", status, external_id);
                return finish(IngestOutcome::Ignored);
            }
            InboundEvent::Malformed {
                external_id,
                reason,
                entry,
            } => {
                warn!(
                    "dropping malformed message entry {:?}: {}",
                    external_id, reason
                );
                self.record_failure(IngestFailure {
                    stage: IngestStage::Parse,
                    tenant_id: None,
                    external_id,
                    error: reason,
                    payload: Some(entry),
                })
                .await;
                return finish(IngestOutcome::Failed {
                    stage: IngestStage::Parse,
                });
            }
            InboundEvent::Unrecognized { reason } => {
                debug!("ignoring webhook payload: {}", reason);
                return finish(IngestOutcome::Ignored);
            }
        };

        let route = message.destination.route();
        let Some(tenant_id) = self.tenants.resolve_inbound(&route).await else {
            warn!(
                "no tenant for inbound message {} (phone_number_id={:?})",
                message.external_id, route.phone_number_id
            );
            self.record_failure(IngestFailure {
                stage: IngestStage::Tenant,
                tenant_id: None,
                external_id: Some(message.external_id.clone()),
                error: format!(
                    "no tenant for phone number id {}",
                    route.phone_number_id.unwrap_or("<none>")
                ),
                payload: None,
            })
            .await;
            return finish(IngestOutcome::Unroutable);
        };

        self.store_inbound(Candidate {
            tenant_id,
            external_id: message.external_id,
            sender: message.sender,
            content: message.content,
            kind: message.kind,
            timestamp: message.timestamp,
        })
        .await
    }

    /// Ingest an already-normalized message. The tenant comes from the
    /// payload, which the caller must have authenticated.
    pub async fn ingest_validated(&self, incoming: IncomingMessage) -> IngestOutcome {
        let candidate = Candidate {
            tenant_id: incoming.tenant_id,
            external_id: incoming.external_id,
            sender: incoming.sender,
            content: incoming.content,
            kind: MessageKind::from_name(&incoming.kind),
            timestamp: incoming.timestamp.and_then(timestamp_from_unix_secs),
        };
        self.store_inbound(candidate).await
    }

    async fn store_inbound(&self, candidate: Candidate) -> IngestOutcome {
        let props = MessageProps {
            sender: candidate.sender.clone(),
            recipient: None,
            content: candidate.content.clone(),
            kind: candidate.kind,
            timestamp: candidate.timestamp,
            external_id: candidate.external_id.clone(),
            tenant_id: candidate.tenant_id.clone(),
            is_outbound: false,
            has_media: None,
            created_at: None,
        };
        let mut message = match Message::create(props, None) {
            Ok(m) => m,
            Err(e) => {
                error!(
                    "rejected inbound message (tenant={:?}, external_id={:?}): {}",
                    candidate.tenant_id, candidate.external_id, e
                );
                self.record_failure(candidate.failure(IngestStage::Validate, e.to_string()))
                    .await;
                return finish(IngestOutcome::Failed {
                    stage: IngestStage::Validate,
                });
            }
        };

        // Fast path only; the unique constraint decides on races
        match self
            .repository
            .find_by_external_id(&candidate.tenant_id, &candidate.external_id)
            .await
        {
            Ok(Some(_)) => {
                info!(
                    "duplicate inbound message {} for tenant {}, skipping",
                    candidate.external_id, candidate.tenant_id
                );
                return finish(IngestOutcome::Duplicate);
            }
            Ok(None) => {}
            Err(e) => {
                error!(
                    "lookup failed for inbound message {} (tenant={}): {}",
                    candidate.external_id, candidate.tenant_id, e
                );
                self.record_failure(candidate.failure(IngestStage::Lookup, e.to_string()))
                    .await;
                return finish(IngestOutcome::Failed {
                    stage: IngestStage::Lookup,
                });
            }
        }

        match self.repository.save(&message).await {
            Ok(SaveOutcome::Inserted) => {
                info!(
                    "stored inbound message {} from {} for tenant {}",
                    candidate.external_id, candidate.sender, candidate.tenant_id
                );
                let message_id = message.id().to_string();
                self.publish_events(&mut message);
                finish(IngestOutcome::Stored { message_id })
            }
            Ok(SaveOutcome::Duplicate) => {
                info!(
                    "duplicate inbound message {} for tenant {} (concurrent delivery), skipping",
                    candidate.external_id, candidate.tenant_id
                );
                finish(IngestOutcome::Duplicate)
            }
            Err(e) => {
                error!(
                    "failed to persist inbound message {} (tenant={}): {}",
                    candidate.external_id, candidate.tenant_id, e
                );
                self.record_failure(candidate.failure(IngestStage::Persist, e.to_string()))
                    .await;
                finish(IngestOutcome::Failed {
                    stage: IngestStage::Persist,
                })
            }
        }
    }
}

fn finish(outcome: IngestOutcome) -> IngestOutcome {
    metrics::counter!("relay_inbound_total", "outcome" => outcome.label()).increment(1);
    outcome
}
