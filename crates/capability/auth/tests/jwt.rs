use domain::Identity;
use jsonwebtoken::{EncodingKey, Header};
use scada_auth::{AuthError, IdentityVerifier, JwtManager};

fn epoch_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[test]
fn jwt_issue_and_verify() {
    let jwt = JwtManager::new("secret".to_string(), 3600);
    let identity = Identity::new("user-1", "Operator One", vec!["operator".to_string()]);

    let token = jwt.issue_access_token(&identity).expect("token");
    let verified = jwt.verify(&token).expect("verify");

    assert_eq!(verified, identity);
}

#[test]
fn jwt_rejects_wrong_secret_and_garbage() {
    let issuer = JwtManager::new("secret".to_string(), 3600);
    let verifier = JwtManager::new("other".to_string(), 3600);
    let token = issuer
        .issue_access_token(&Identity::new("user-1", "u", Vec::new()))
        .expect("token");

    assert_eq!(verifier.verify(&token), Err(AuthError::TokenInvalid));
    assert_eq!(verifier.verify("not-a-jwt"), Err(AuthError::TokenInvalid));
    assert_eq!(verifier.verify("  "), Err(AuthError::TokenMissing));
}

#[test]
fn jwt_rejects_expired_token() {
    let claims = serde_json::json!({
        "sub": "user-1",
        "roles": [],
        "exp": epoch_seconds() - 3600,
        "token_type": "access",
    });
    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"secret"),
    )
    .expect("encode");

    let jwt = JwtManager::new("secret".to_string(), 3600);
    assert_eq!(jwt.verify(&token), Err(AuthError::TokenExpired));
}

#[test]
fn jwt_rejects_refresh_token_type() {
    let claims = serde_json::json!({
        "sub": "user-1",
        "exp": epoch_seconds() + 3600,
        "token_type": "refresh",
    });
    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"secret"),
    )
    .expect("encode");

    let jwt = JwtManager::new("secret".to_string(), 3600);
    assert_eq!(jwt.verify(&token), Err(AuthError::TokenInvalid));
}
