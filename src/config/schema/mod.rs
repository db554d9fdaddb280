use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::errors::RelayError;

/// Generates a `Debug` impl that redacts secret fields.
///
/// Field specifiers:
/// - `field_name`            — printed normally via `&self.field_name`
/// - `redact(field_name)`    — `String` field: shows `[empty]` or `[REDACTED]`
macro_rules! redact_debug {
    (@field $builder:ident, $self:ident, redact($field:ident)) => {
        $builder.field(
            stringify!($field),
            &if $self.$field.is_empty() {
                "[empty]"
            } else {
                "[REDACTED]"
            },
        );
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };

    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };

    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// SQLite database file. Empty means `relay.db` under the relay home.
    #[serde(default)]
    pub path: String,
}

// ---------------------------------------------------------------------------
// WhatsApp Cloud API
// ---------------------------------------------------------------------------

fn default_api_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v18.0".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

#[derive(Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default = "default_api_base_url", rename = "apiBaseUrl")]
    pub api_base_url: String,
    #[serde(default = "default_api_version", rename = "apiVersion")]
    pub api_version: String,
    #[serde(default, rename = "phoneNumberId")]
    pub phone_number_id: String,
    #[serde(default, rename = "accessToken")]
    pub access_token: String,
    #[serde(default = "default_timeout_secs", rename = "timeoutSecs")]
    pub timeout_secs: u64,
    /// Total send attempts, including the first. 1 disables retry.
    #[serde(default = "default_max_attempts", rename = "maxAttempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms", rename = "retryBaseDelayMs")]
    pub retry_base_delay_ms: u64,
}

redact_debug!(
    WhatsAppConfig,
    api_base_url,
    api_version,
    phone_number_id,
    redact(access_token),
    timeout_secs,
    max_attempts,
    retry_base_delay_ms,
);

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_version: default_api_version(),
            phone_number_id: String::new(),
            access_token: String::new(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

fn default_max_body_bytes() -> usize {
    1_048_576
}

#[derive(Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Token Meta echoes during subscription verification.
    #[serde(default, rename = "verifyToken")]
    pub verify_token: String,
    /// Meta app secret. When set, `X-Hub-Signature-256` is required.
    #[serde(default, rename = "appSecret")]
    pub app_secret: String,
    /// Shared secret for the normalized `/webhook/inbound` endpoint.
    #[serde(default, rename = "inboundSecret")]
    pub inbound_secret: String,
    #[serde(default = "default_max_body_bytes", rename = "maxBodyBytes")]
    pub max_body_bytes: usize,
}

redact_debug!(
    WebhookConfig,
    redact(verify_token),
    redact(app_secret),
    redact(inbound_secret),
    max_body_bytes,
);

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            verify_token: String::new(),
            app_secret: String::new(),
            inbound_secret: String::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tenants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TenantsConfig {
    /// Tenant for inbound events whose phone number id has no mapping.
    #[serde(default, rename = "defaultTenant")]
    pub default_tenant: String,
    /// Meta `phone_number_id` -> tenant id.
    #[serde(default, rename = "phoneNumbers")]
    pub phone_numbers: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

fn default_token_ttl_secs() -> u64 {
    86_400
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, rename = "tokenSecret")]
    pub token_secret: String,
    #[serde(default = "default_token_ttl_secs", rename = "tokenTtlSecs")]
    pub token_ttl_secs: u64,
}

redact_debug!(AuthConfig, redact(token_secret), token_ttl_secs,);

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: String::new(),
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub tenants: TenantsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Config {
    /// Resolved SQLite path.
    pub fn storage_path(&self) -> anyhow::Result<PathBuf> {
        if self.storage.path.is_empty() {
            Ok(crate::utils::get_relay_home()?.join("relay.db"))
        } else {
            Ok(crate::utils::expand_home(&self.storage.path))
        }
    }

    /// Structural checks. Missing credentials are allowed here so that
    /// `init` and the read-only CLI commands work on a fresh config.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.gateway.port == 0 {
            return Err(RelayError::Config("gateway.port must be > 0".into()));
        }
        self.validate_whatsapp()?;
        if self.webhook.max_body_bytes == 0 {
            return Err(RelayError::Config(
                "webhook.maxBodyBytes must be > 0".into(),
            ));
        }
        if self.auth.token_ttl_secs == 0 {
            return Err(RelayError::Config("auth.tokenTtlSecs must be > 0".into()));
        }
        for (phone_number_id, tenant) in &self.tenants.phone_numbers {
            if tenant.trim().is_empty() {
                return Err(RelayError::Config(format!(
                    "tenants.phoneNumbers.{phone_number_id} must map to a non-empty tenant id"
                )));
            }
        }
        Ok(())
    }

    fn validate_whatsapp(&self) -> Result<(), RelayError> {
        let w = &self.whatsapp;
        if !(1..=5).contains(&w.max_attempts) {
            return Err(RelayError::Config(
                "whatsapp.maxAttempts must be between 1 and 5".into(),
            ));
        }
        if w.timeout_secs == 0 {
            return Err(RelayError::Config(
                "whatsapp.timeoutSecs must be > 0".into(),
            ));
        }
        if !(w.api_base_url.starts_with("http://") || w.api_base_url.starts_with("https://")) {
            return Err(RelayError::Config(
                "whatsapp.apiBaseUrl must start with http:// or https://".into(),
            ));
        }
        Ok(())
    }

    /// Everything `validate` checks plus the credentials and tenant routes
    /// `serve` cannot run without.
    pub fn validate_for_serving(&self) -> Result<(), RelayError> {
        self.validate()?;
        let required = [
            ("whatsapp.accessToken", &self.whatsapp.access_token),
            ("whatsapp.phoneNumberId", &self.whatsapp.phone_number_id),
            ("webhook.verifyToken", &self.webhook.verify_token),
            ("auth.tokenSecret", &self.auth.token_secret),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(RelayError::Config(format!("{name} is required to serve")));
            }
        }
        if self.tenants.default_tenant.trim().is_empty() && self.tenants.phone_numbers.is_empty() {
            return Err(RelayError::Config(
                "tenants needs a defaultTenant or at least one phoneNumbers entry".into(),
            ));
        }
        Ok(())
    }
}
