use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::{RelayError, RelayResult};

/// Sender recorded on messages this system sends itself.
pub const SELF_SENDER: &str = "ME";

/// Content type of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Document,
    Audio,
    #[default]
    Unknown,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Unknown => "unknown",
        }
    }

    /// Map a provider or stored type name to a kind. Case-insensitive;
    /// WhatsApp voice notes count as audio, anything unrecognised is `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "text" => Self::Text,
            "image" => Self::Image,
            "document" => Self::Document,
            "audio" | "voice" => Self::Audio,
            _ => Self::Unknown,
        }
    }

    /// Image, audio and document messages carry an attachment.
    pub fn is_media(self) -> bool {
        matches!(self, Self::Image | Self::Audio | Self::Document)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert a provider Unix timestamp (seconds). Returns `None` for values that
/// are non-positive or outside chrono's range.
pub fn timestamp_from_unix_secs(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    Utc.timestamp_opt(secs, 0).single()
}

/// Input to [`Message::create`].
#[derive(Debug, Clone, Default)]
pub struct MessageProps {
    pub sender: String,
    pub recipient: Option<String>,
    pub content: String,
    pub kind: MessageKind,
    /// Provider event time. Defaults to now.
    pub timestamp: Option<DateTime<Utc>>,
    pub external_id: String,
    pub tenant_id: String,
    pub is_outbound: bool,
    /// Explicit override; derived from `kind` when `None`.
    pub has_media: Option<bool>,
    /// Set when reconstituting from storage. Defaults to now.
    pub created_at: Option<DateTime<Utc>>,
}

/// Raised when a fresh inbound message is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReceived {
    pub message_id: String,
    pub external_id: String,
    pub tenant_id: String,
    pub occurred_at: DateTime<Utc>,
}

/// A stored message. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: String,
    sender: String,
    recipient: Option<String>,
    content: String,
    kind: MessageKind,
    timestamp: DateTime<Utc>,
    external_id: String,
    tenant_id: String,
    is_outbound: bool,
    has_media: bool,
    created_at: DateTime<Utc>,
    events: Vec<MessageReceived>,
}

impl Message {
    /// Build a message, enforcing tenant ownership and external-id presence.
    ///
    /// Pass `id` when reconstituting a stored row; a fresh id is generated
    /// otherwise. Only fresh inbound messages record a [`MessageReceived`]
    /// event.
    pub fn create(props: MessageProps, id: Option<String>) -> RelayResult<Self> {
        if props.tenant_id.trim().is_empty() {
            return Err(RelayError::InvalidDomainState(
                "message requires a tenant id".into(),
            ));
        }
        if props.external_id.trim().is_empty() {
            return Err(RelayError::InvalidDomainState(
                "message requires an external id".into(),
            ));
        }

        let fresh = id.is_none();
        let id = match id {
            Some(id) if id.trim().is_empty() => {
                return Err(RelayError::InvalidDomainState(
                    "message id must not be empty".into(),
                ));
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        let now = Utc::now();
        let has_media = props.has_media.unwrap_or_else(|| props.kind.is_media());
        let mut message = Self {
            id,
            sender: props.sender,
            recipient: props.recipient,
            content: props.content,
            kind: props.kind,
            timestamp: props.timestamp.unwrap_or(now),
            external_id: props.external_id,
            tenant_id: props.tenant_id,
            is_outbound: props.is_outbound,
            has_media,
            created_at: props.created_at.unwrap_or(now),
            events: Vec::new(),
        };

        if fresh && !message.is_outbound {
            message.events.push(MessageReceived {
                message_id: message.id.clone(),
                external_id: message.external_id.clone(),
                tenant_id: message.tenant_id.clone(),
                occurred_at: now,
            });
        }

        Ok(message)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn is_outbound(&self) -> bool {
        self.is_outbound
    }

    pub fn has_media(&self) -> bool {
        self.has_media
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// `"outbound"` for messages we sent, `"inbound"` otherwise.
    pub fn direction(&self) -> &'static str {
        if self.is_outbound {
            "outbound"
        } else {
            "inbound"
        }
    }

    pub fn pending_events(&self) -> &[MessageReceived] {
        &self.events
    }

    /// Drain recorded events so they are published at most once.
    pub fn take_events(&mut self) -> Vec<MessageReceived> {
        std::mem::take(&mut self.events)
    }
}
