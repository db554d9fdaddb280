//! Meta WhatsApp Cloud API webhook payloads.
//!
//! A notification is parsed once into [`InboundEvent`]s; the pipeline only
//! ever dispatches on the variant.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use wa_relay_core::{InboundRoute, MessageKind, timestamp_from_unix_secs};

// --- Meta webhook payload types ---

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    #[serde(default)]
    value: Option<ChangeValue>,
}

#[derive(Debug, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    metadata: Option<Metadata>,
    /// Kept raw so one odd entry cannot sink its siblings.
    #[serde(default)]
    messages: Vec<serde_json::Value>,
    #[serde(default)]
    statuses: Vec<serde_json::Value>,
}

/// The business phone number the event was delivered to.
#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    display_phone_number: Option<String>,
    #[serde(default)]
    phone_number_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    from: Option<String>,
    /// Unix seconds; Meta sends a string but numbers are accepted too.
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
    #[serde(default, rename = "type")]
    msg_type: Option<String>,
    #[serde(default)]
    text: Option<WireText>,
}

#[derive(Debug, Deserialize)]
struct WireText {
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

// --- Parsed events ---

/// Where an inbound event was delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destination {
    pub phone_number_id: Option<String>,
    pub display_phone_number: Option<String>,
}

impl Destination {
    pub fn route(&self) -> InboundRoute<'_> {
        InboundRoute {
            phone_number_id: self.phone_number_id.as_deref(),
            display_phone_number: self.display_phone_number.as_deref(),
        }
    }
}

/// A user message extracted from a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub destination: Destination,
    pub external_id: String,
    pub sender: String,
    /// `None` when the provider timestamp is missing or invalid.
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: MessageKind,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Text(InboundMessage),
    /// Any non-text message. `content` holds a placeholder naming the type.
    Media(InboundMessage),
    /// Delivery/read receipt for a message we sent. Nothing to store.
    StatusUpdate { external_id: String, status: String },
    /// A message entry that could not be read. Recorded, never stored.
    Malformed {
        external_id: Option<String>,
        reason: String,
        entry: String,
    },
    /// Anything else with nothing to store.
    Unrecognized { reason: String },
}

impl InboundEvent {
    pub fn message(&self) -> Option<&InboundMessage> {
        match self {
            Self::Text(m) | Self::Media(m) => Some(m),
            Self::StatusUpdate { .. } | Self::Malformed { .. } | Self::Unrecognized { .. } => {
                None
            }
        }
    }
}

/// Placeholder stored for message types we do not render.
pub fn unsupported_placeholder(msg_type: &str) -> String {
    format!("[UNSUPPORTED CONTENT TYPE: {}]", msg_type.to_uppercase())
}

fn parse_timestamp(value: Option<&serde_json::Value>) -> Option<DateTime<Utc>> {
    let secs = match value? {
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok()?,
        serde_json::Value::Number(n) => n.as_i64()?,
        _ => return None,
    };
    timestamp_from_unix_secs(secs)
}

fn malformed(raw: &serde_json::Value, reason: String) -> InboundEvent {
    InboundEvent::Malformed {
        external_id: raw
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
        reason,
        entry: raw.to_string(),
    }
}

fn convert_message(destination: &Destination, raw: serde_json::Value) -> InboundEvent {
    let msg = match WireMessage::deserialize(&raw) {
        Ok(msg) => msg,
        Err(e) => return malformed(&raw, format!("invalid message entry: {e}")),
    };
    let (Some(external_id), Some(sender)) = (
        msg.id.filter(|id| !id.trim().is_empty()),
        msg.from.filter(|from| !from.trim().is_empty()),
    ) else {
        return malformed(&raw, "message entry without id or sender".into());
    };

    let timestamp = parse_timestamp(msg.timestamp.as_ref());
    let msg_type = msg.msg_type.unwrap_or_else(|| "unknown".to_string());
    let kind = MessageKind::from_name(&msg_type);

    if kind == MessageKind::Text {
        let content = msg.text.and_then(|t| t.body).unwrap_or_default();
        InboundEvent::Text(InboundMessage {
            destination: destination.clone(),
            external_id,
            sender,
            timestamp,
            kind,
            content,
        })
    } else {
        InboundEvent::Media(InboundMessage {
            destination: destination.clone(),
            external_id,
            sender,
            timestamp,
            kind,
            content: unsupported_placeholder(&msg_type),
        })
    }
}

/// Parse a raw webhook body into events, one per message or status in every
/// entry and change. Never fails: an unparseable body or one with nothing
/// actionable yields a single `Unrecognized` event, and a bad message entry
/// becomes `Malformed` without affecting the rest of the batch.
pub fn parse_events(body: &[u8]) -> Vec<InboundEvent> {
    let notification: Notification = match serde_json::from_slice(body) {
        Ok(n) => n,
        Err(e) => {
            return vec![InboundEvent::Unrecognized {
                reason: format!("invalid notification json: {e}"),
            }];
        }
    };

    let mut events = Vec::new();
    for change in notification.entry.into_iter().flat_map(|e| e.changes) {
        let Some(value) = change.value else {
            continue;
        };
        let destination = value
            .metadata
            .map(|m| Destination {
                phone_number_id: m.phone_number_id,
                display_phone_number: m.display_phone_number,
            })
            .unwrap_or_default();

        for msg in value.messages {
            events.push(convert_message(&destination, msg));
        }
        for raw in value.statuses {
            events.push(match WireStatus::deserialize(&raw) {
                Ok(status) => InboundEvent::StatusUpdate {
                    external_id: status.id.unwrap_or_default(),
                    status: status.status.unwrap_or_default(),
                },
                Err(e) => InboundEvent::Unrecognized {
                    reason: format!("invalid status entry: {e}"),
                },
            });
        }
    }

    if events.is_empty() {
        events.push(InboundEvent::Unrecognized {
            reason: "notification carries no messages or statuses".into(),
        });
    }
    events
}

#[cfg(test)]
mod tests;
