use super::*;
use chrono::Duration;

#[test]
fn test_issue_and_verify() {
    let signer = TokenSigner::new("s3cret").unwrap();
    let token = signer.issue("ops@example.com", "T1", 3600).unwrap();
    let caller = signer.verify(&token).unwrap();
    assert_eq!(caller.tenant_id, "T1");
    assert_eq!(caller.subject, "ops@example.com");
}

#[test]
fn test_empty_secret_rejected() {
    assert!(matches!(
        TokenSigner::new("").unwrap_err(),
        RelayError::Config(_)
    ));
}

#[test]
fn test_issue_requires_tenant() {
    let signer = TokenSigner::new("s3cret").unwrap();
    assert!(matches!(
        signer.issue("ops", " ", 60).unwrap_err(),
        RelayError::Validation(_)
    ));
}

#[test]
fn test_wrong_secret_rejected() {
    let token = TokenSigner::new("one").unwrap().issue("a", "T1", 60).unwrap();
    let err = TokenSigner::new("two").unwrap().verify(&token).unwrap_err();
    assert!(matches!(err, RelayError::Auth(_)));
}

#[test]
fn test_tampered_claims_rejected() {
    let signer = TokenSigner::new("s3cret").unwrap();
    let token = signer.issue("a", "T1", 60).unwrap();
    let (_, signature) = token.split_once('.').unwrap();
    let forged_claims = URL_SAFE_NO_PAD.encode(br#"{"sub":"a","tenantId":"T2","exp":99999999999}"#);
    let forged = format!("{forged_claims}.{signature}");
    assert!(signer.verify(&forged).is_err());
}

#[test]
fn test_expired_token_rejected() {
    let signer = TokenSigner::new("s3cret").unwrap();
    let token = signer.issue("a", "T1", 60).unwrap();
    let later = Utc::now() + Duration::seconds(120);
    let err = signer.verify_at(&token, later).unwrap_err();
    assert!(err.to_string().contains("expired"));
}

#[test]
fn test_malformed_tokens_rejected() {
    let signer = TokenSigner::new("s3cret").unwrap();
    for token in ["", "nodot", "a.b", "...."] {
        assert!(signer.verify(token).is_err(), "accepted {token:?}");
    }
}

#[test]
fn test_debug_hides_secret() {
    let signer = TokenSigner::new("s3cret").unwrap();
    assert!(!format!("{signer:?}").contains("s3cret"));
}

#[test]
fn test_bearer_token_extraction() {
    assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
    assert_eq!(bearer_token("bearer abc"), Some("abc"));
    assert_eq!(bearer_token("Basic abc"), None);
    assert_eq!(bearer_token("Bearer "), None);
    assert_eq!(bearer_token("Bearer"), None);
}
