use super::*;

#[test]
fn test_every_slot_has_env_var_and_field() {
    let config = Config::default();
    for (name, env) in CREDENTIAL_ENV_VARS {
        assert!(env.starts_with("WA_RELAY_"));
        assert!(get_credential_value(&config, name).is_some());
    }
}

#[test]
fn test_get_credential_value() {
    let mut config = Config::default();
    config.auth.token_secret = "sign-me".to_string();
    assert_eq!(
        get_credential_value(&config, "auth-token-secret"),
        Some("sign-me")
    );
    assert!(get_credential_value(&config, "nonexistent").is_none());
}

#[test]
fn test_apply_env_overrides() {
    let mut config = Config::default();
    assert!(config.webhook.app_secret.is_empty());

    unsafe { std::env::set_var("WA_RELAY_WEBHOOK_APP_SECRET", "from-env") };
    apply_env_overrides(&mut config);
    assert_eq!(config.webhook.app_secret, "from-env");

    unsafe { std::env::remove_var("WA_RELAY_WEBHOOK_APP_SECRET") };
}

#[test]
fn test_apply_env_overrides_empty_ignored() {
    let mut config = Config::default();
    config.webhook.inbound_secret = "original".to_string();

    unsafe { std::env::set_var("WA_RELAY_WEBHOOK_INBOUND_SECRET", "") };
    apply_env_overrides(&mut config);
    assert_eq!(config.webhook.inbound_secret, "original");

    unsafe { std::env::remove_var("WA_RELAY_WEBHOOK_INBOUND_SECRET") };
}

#[test]
fn test_credential_sources_config_and_empty() {
    let mut config = Config::default();
    config.webhook.verify_token = "verify".to_string();
    let sources = credential_sources(&config);
    let verify = sources
        .iter()
        .find(|(name, _)| *name == "webhook-verify-token")
        .unwrap();
    assert_eq!(verify.1, CredentialSource::Config);
    assert_eq!(sources.len(), CREDENTIAL_ENV_VARS.len());
}
