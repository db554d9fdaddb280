pub mod credentials;
pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, save_config};
pub use schema::{
    AuthConfig, Config, GatewayConfig, StorageConfig, TenantsConfig, WebhookConfig,
    WhatsAppConfig,
};
