use std::time::Duration;

use ticket_office::{auth, db::user::Role};

#[tokio::test]
async fn issued_token_verifies_to_the_same_identity() {
    let verifier = auth::Verifier::new("secret", Duration::from_secs(3600));

    let token = verifier.issue(7.into(), Role::User).unwrap();
    let identity = verifier.verify(&token).unwrap();

    assert_eq!(identity.user_id, 7.into());
    assert_eq!(identity.role, Role::User);
}

#[tokio::test]
async fn token_signed_with_another_secret_is_rejected() {
    let issuer = auth::Verifier::new("secret", Duration::from_secs(3600));
    let verifier = auth::Verifier::new("other", Duration::from_secs(3600));

    let token = issuer.issue(7.into(), Role::User).unwrap();
    assert!(verifier.verify(&token).is_err());
}

#[tokio::test]
async fn garbage_token_is_rejected() {
    let verifier = auth::Verifier::new("secret", Duration::from_secs(3600));
    assert!(verifier.verify("not-a-token").is_err());
}
