use super::schema::Config;

macro_rules! define_credentials {
    ($( $name:literal, $env:literal => $($path:ident).+ );* $(;)?) => {
        /// (slot name, env var name) pairs.
        pub const CREDENTIAL_ENV_VARS: &[(&str, &str)] = &[$(($name, $env)),*];

        /// Get the current value of a credential field by slot name.
        pub fn get_credential_value<'a>(config: &'a Config, name: &str) -> Option<&'a str> {
            match name {
                $($name => Some(config.$($path).+.as_str()),)*
                _ => None,
            }
        }

        /// Apply environment variable overrides.
        ///
        /// Any `WA_RELAY_*` env var that is set and non-empty overwrites the
        /// corresponding config field, so secrets can be injected without
        /// touching the config file.
        pub fn apply_env_overrides(config: &mut Config) {
            $(
                if let Ok(val) = std::env::var($env) {
                    if !val.is_empty() {
                        config.$($path).+ = val;
                    }
                }
            )*
        }
    };
}

define_credentials! {
    "whatsapp-access-token",  "WA_RELAY_WHATSAPP_ACCESS_TOKEN"  => whatsapp.access_token;
    "webhook-verify-token",   "WA_RELAY_WEBHOOK_VERIFY_TOKEN"   => webhook.verify_token;
    "webhook-app-secret",     "WA_RELAY_WEBHOOK_APP_SECRET"     => webhook.app_secret;
    "webhook-inbound-secret", "WA_RELAY_WEBHOOK_INBOUND_SECRET" => webhook.inbound_secret;
    "auth-token-secret",      "WA_RELAY_AUTH_TOKEN_SECRET"      => auth.token_secret;
}

/// Where a credential's effective value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Env,
    Config,
    Empty,
}

impl CredentialSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::Config => "config",
            Self::Empty => "[empty]",
        }
    }
}

/// Report the source of every credential slot without exposing values.
/// `config` should be the file contents before env overrides are applied.
pub fn credential_sources(config: &Config) -> Vec<(&'static str, CredentialSource)> {
    CREDENTIAL_ENV_VARS
        .iter()
        .map(|&(name, env)| {
            let from_env = std::env::var(env).is_ok_and(|v| !v.is_empty());
            let source = if from_env {
                CredentialSource::Env
            } else if get_credential_value(config, name).is_some_and(|v| !v.is_empty()) {
                CredentialSource::Config
            } else {
                CredentialSource::Empty
            };
            (name, source)
        })
        .collect()
}

#[cfg(test)]
mod tests;
