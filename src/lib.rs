#![warn(clippy::pedantic)]
// Noisy doc/signature lints
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Keeping format!("{}", x) over format!("{x}") for readability with complex exprs
#![allow(clippy::uninlined_format_args)]
// Timestamps and row counts cross i64/u64/usize at the SQLite and token boundaries
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod gateway;
pub mod pipeline;
pub mod provider;
pub mod store;
pub mod tenant;
pub(crate) mod utils;
pub mod webhook;

pub use wa_relay_core::errors;
pub use wa_relay_core::{
    Caller, Message, MessageKind, MessageReceived, RelayError, RelayResult, SaveOutcome,
};

/// Re-exports for fuzz targets. Not part of the public API.
#[doc(hidden)]
pub mod fuzz_api {
    pub use crate::webhook::parse_events;

    /// Wrapper around `gateway::validate_webhook_signature` for fuzz targets.
    pub fn validate_webhook_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
        crate::gateway::validate_webhook_signature(secret, signature, body)
    }
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
