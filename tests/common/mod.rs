// Shared test helpers — not all items used by every test binary.
#![allow(unused)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use wa_relay::pipeline::{IncomingMessage, MessageService};
use wa_relay::store::SqliteMessageStore;
use wa_relay::tenant::StaticTenantResolver;
use wa_relay_core::{MessagingProvider, ProviderReceipt, RelayError, RelayResult};

/// One scripted provider reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Sent(String),
    Fail { message: String, retryable: bool },
}

#[derive(Debug, Clone)]
pub struct RecordedSend {
    pub recipient: String,
    pub content: String,
}

/// Provider that replays scripted replies in order, then falls back to
/// `wamid.DEFAULT-<n>` ids.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    pub calls: Mutex<Vec<RecordedSend>>,
}

impl ScriptedProvider {
    pub fn with_replies(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from(replies)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MessagingProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn send_text(&self, recipient: &str, content: &str) -> RelayResult<ProviderReceipt> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(RecordedSend {
                recipient: recipient.to_string(),
                content: content.to_string(),
            });
            calls.len()
        };
        match self.replies.lock().unwrap().pop_front() {
            Some(Reply::Sent(id)) => Ok(ProviderReceipt {
                provider_message_id: id,
            }),
            Some(Reply::Fail { message, retryable }) => Err(RelayError::Provider {
                message,
                code: None,
                retryable,
            }),
            None => Ok(ProviderReceipt {
                provider_message_id: format!("wamid.DEFAULT-{n}"),
            }),
        }
    }
}

pub struct Relay {
    pub service: Arc<MessageService>,
    pub store: Arc<SqliteMessageStore>,
    pub provider: Arc<ScriptedProvider>,
}

pub fn relay_with(provider: ScriptedProvider, tenants: StaticTenantResolver) -> Relay {
    let store = Arc::new(SqliteMessageStore::open_in_memory().unwrap());
    let provider = Arc::new(provider);
    let service = MessageService::new(store.clone(), provider.clone(), Arc::new(tenants))
        .with_failure_recorder(store.clone());
    Relay {
        service: Arc::new(service),
        store,
        provider,
    }
}

pub fn relay(tenant: &str) -> Relay {
    relay_with(ScriptedProvider::default(), StaticTenantResolver::single(tenant))
}

pub fn incoming(external_id: &str, tenant: &str, timestamp: i64) -> IncomingMessage {
    serde_json::from_value(serde_json::json!({
        "sender": "5551234",
        "content": "hi",
        "type": "text",
        "timestampUnixSeconds": timestamp,
        "externalId": external_id,
        "tenantId": tenant
    }))
    .unwrap()
}

/// A Meta notification carrying one text message per id.
pub fn notification(phone_number_id: &str, external_ids: &[&str]) -> Vec<u8> {
    let messages: Vec<_> = external_ids
        .iter()
        .map(|id| {
            serde_json::json!({
                "from": "5551234",
                "id": id,
                "timestamp": "1700000000",
                "type": "text",
                "text": {"body": format!("body of {id}")}
            })
        })
        .collect();
    serde_json::to_vec(&serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{"id": "WABA", "changes": [{"field": "messages", "value": {
            "messaging_product": "whatsapp",
            "metadata": {"phone_number_id": phone_number_id, "display_phone_number": "15550001111"},
            "messages": messages
        }}]}]
    }))
    .unwrap()
}
