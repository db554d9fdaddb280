//! Seams between the relay pipeline and its adapters.

use async_trait::async_trait;

use crate::errors::RelayResult;
use crate::message::Message;

/// Result of an insert-if-absent save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    /// A row with the same `(tenant_id, external_id)` already existed; nothing
    /// was written.
    Duplicate,
}

/// Persistent message storage. Implementations must enforce uniqueness of
/// `(tenant_id, external_id)` atomically, so concurrent saves of the same
/// pair yield exactly one `Inserted`.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn save(&self, message: &Message) -> RelayResult<SaveOutcome>;

    async fn find_by_external_id(
        &self,
        tenant_id: &str,
        external_id: &str,
    ) -> RelayResult<Option<Message>>;

    /// All messages for one tenant, oldest first.
    async fn find_by_tenant(&self, tenant_id: &str) -> RelayResult<Vec<Message>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReceipt {
    pub provider_message_id: String,
}

/// Outbound messaging provider.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Send a plain text message. The returned id is the provider's message id.
    async fn send_text(&self, recipient: &str, content: &str) -> RelayResult<ProviderReceipt>;
}

/// Routing data carried by an inbound event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboundRoute<'a> {
    pub phone_number_id: Option<&'a str>,
    pub display_phone_number: Option<&'a str>,
}

/// Maps inbound routing data to the owning tenant. `None` means unroutable.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    async fn resolve_inbound(&self, route: &InboundRoute<'_>) -> Option<String>;
}

/// Authenticated API caller. The tenant always comes from here, never from
/// request bodies or query strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub subject: String,
    pub tenant_id: String,
}

pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> RelayResult<Caller>;
}

/// Pipeline step at which an inbound event was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngestStage {
    Parse,
    Tenant,
    Validate,
    Lookup,
    Persist,
}

impl IngestStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Tenant => "tenant",
            Self::Validate => "validate",
            Self::Lookup => "lookup",
            Self::Persist => "persist",
        }
    }
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound event that was acknowledged but not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestFailure {
    pub stage: IngestStage,
    pub tenant_id: Option<String>,
    pub external_id: Option<String>,
    pub error: String,
    pub payload: Option<String>,
}

/// Durable sink for swallowed ingestion failures. Recording is best-effort:
/// callers log and move on when it fails.
#[async_trait]
pub trait FailureRecorder: Send + Sync {
    async fn record_failure(&self, failure: &IngestFailure) -> RelayResult<()>;
}
