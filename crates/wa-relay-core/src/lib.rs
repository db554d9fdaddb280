//! Domain types and ports for wa-relay.
//!
//! This crate has no I/O. Adapters (storage, the WhatsApp Cloud API client,
//! the HTTP gateway) live in the `wa-relay` crate and plug in through the
//! traits in [`ports`].

pub mod errors;
pub mod message;
pub mod ports;

pub use errors::{RelayError, RelayResult};
pub use message::{
    Message, MessageKind, MessageProps, MessageReceived, SELF_SENDER, timestamp_from_unix_secs,
};
pub use ports::{
    Caller, FailureRecorder, InboundRoute, IngestFailure, IngestStage, MessageRepository,
    MessagingProvider, ProviderReceipt, SaveOutcome, TenantResolver, TokenVerifier,
};
