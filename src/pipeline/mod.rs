//! Message service: idempotent inbound ingestion, outbound sends, and
//! per-tenant history.

mod ingest;
mod outbound;

pub use ingest::IncomingMessage;
pub use outbound::SendRequest;

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error};
use wa_relay_core::{
    FailureRecorder, IngestFailure, IngestStage, Message, MessageReceived, MessageRepository,
    MessagingProvider, RelayError, RelayResult, TenantResolver,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What happened to one inbound event. Ingestion never returns an error;
/// failures are reported here and in the failure log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored { message_id: String },
    /// Already stored for this tenant.
    Duplicate,
    /// Not a user message (status update, unrecognized payload).
    Ignored,
    /// No tenant owns the destination.
    Unroutable,
    Failed { stage: IngestStage },
}

impl IngestOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stored { .. } => "stored",
            Self::Duplicate => "duplicate",
            Self::Ignored => "ignored",
            Self::Unroutable => "unroutable",
            Self::Failed { .. } => "failed",
        }
    }
}

pub struct MessageService {
    repository: Arc<dyn MessageRepository>,
    provider: Arc<dyn MessagingProvider>,
    tenants: Arc<dyn TenantResolver>,
    failures: Option<Arc<dyn FailureRecorder>>,
    events: broadcast::Sender<MessageReceived>,
}

impl MessageService {
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        provider: Arc<dyn MessagingProvider>,
        tenants: Arc<dyn TenantResolver>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            repository,
            provider,
            tenants,
            failures: None,
            events,
        }
    }

    pub fn with_failure_recorder(mut self, recorder: Arc<dyn FailureRecorder>) -> Self {
        self.failures = Some(recorder);
        self
    }

    /// Receive a `MessageReceived` for every newly stored inbound message.
    pub fn subscribe(&self) -> broadcast::Receiver<MessageReceived> {
        self.events.subscribe()
    }

    /// All messages for `tenant_id`, oldest first.
    pub async fn history(&self, tenant_id: &str) -> RelayResult<Vec<Message>> {
        if tenant_id.trim().is_empty() {
            return Err(RelayError::Validation("tenant id must not be empty".into()));
        }
        self.repository.find_by_tenant(tenant_id).await
    }

    fn publish_events(&self, message: &mut Message) {
        for event in message.take_events() {
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }

    async fn record_failure(&self, failure: IngestFailure) {
        metrics::counter!("relay_ingest_failures_total", "stage" => failure.stage.as_str())
            .increment(1);
        let Some(recorder) = &self.failures else {
            return;
        };
        if let Err(e) = recorder.record_failure(&failure).await {
            error!(
                "could not record ingest failure (stage={}, external_id={:?}): {}",
                failure.stage, failure.external_id, e
            );
        } else {
            debug!("recorded ingest failure at stage {}", failure.stage);
        }
    }
}
