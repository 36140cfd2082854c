use async_trait::async_trait;
use expense_tracker::error::AuthError;
use expense_tracker::federated::{CodeExchange, FederatedConfig, FederatedIdentity};
use expense_tracker::login::{AuthEvent, AuthService, MIN_PASSWORD_LEN};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const TTL: Duration = Duration::from_secs(3600);

/// Answers every code with the same identity, and `bad` with an error.
struct StubExchange {
    identity: FederatedIdentity,
}

#[async_trait]
impl CodeExchange for StubExchange {
    async fn exchange(&self, code: &str) -> Result<FederatedIdentity, AuthError> {
        if code == "bad" {
            return Err(AuthError::Exchange("invalid_grant".to_string()));
        }
        Ok(self.identity.clone())
    }
}

fn federated_service(subject: &str, email: &str, email_verified: bool) -> AuthService {
    let config = FederatedConfig {
        authorize_url: "https://id.example.com/authorize".to_string(),
        token_url: "https://id.example.com/token".to_string(),
        client_id: "tracker".to_string(),
        client_secret: "s3cret".to_string(),
        redirect_url: "http://localhost:3000/login/federated/callback".to_string(),
    };
    let exchange = StubExchange {
        identity: FederatedIdentity {
            subject: subject.to_string(),
            email: email.to_string(),
            email_verified,
        },
    };
    AuthService::in_memory(TTL).with_federated(config, Arc::new(exchange))
}

#[test]
fn sign_up_and_sign_in_errors_are_readable() {
    let auth = AuthService::in_memory(TTL);

    let err = auth.sign_up("ana@example.com", "").unwrap_err();
    assert_eq!(err.to_string(), "Email and password are required");

    let err = auth.sign_up("ana@example.com", "abc").unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Password should be at least {} characters", MIN_PASSWORD_LEN)
    );

    auth.sign_up("ana@example.com", "secret1").unwrap();
    let err = auth.sign_up("ana@example.com", "secret2").unwrap_err();
    assert!(matches!(err, AuthError::EmailInUse));

    let err = auth.sign_in("ana@example.com", "wrong-one").unwrap_err();
    assert_eq!(err.to_string(), "Invalid email or password");
    let err = auth.sign_in("bob@example.com", "secret1").unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[test]
fn concurrent_sign_ups_for_one_email_register_once() {
    let auth = Arc::new(AuthService::in_memory(TTL));

    let handles: Vec<_> = ["password-a", "password-b"]
        .into_iter()
        .map(|password| {
            let auth = Arc::clone(&auth);
            std::thread::spawn(move || (password, auth.sign_up("x@y.z", password)))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners: Vec<_> = results.iter().filter(|(_, r)| r.is_ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(results
        .iter()
        .any(|(_, r)| matches!(r, Err(AuthError::EmailInUse))));

    let (password, identity) = winners[0];
    let identity = identity.as_ref().unwrap();
    assert_eq!(&auth.sign_in("x@y.z", password).unwrap(), identity);
}

#[test]
fn sessions_publish_sign_in_and_sign_out() {
    let auth = AuthService::in_memory(TTL);
    let mut events = auth.subscribe();

    let identity = auth.sign_up("ana@example.com", "secret1").unwrap();
    let session = auth.start_session(&identity).unwrap();
    assert_eq!(auth.current_identity(&session), Some(identity.clone()));

    auth.sign_out(&session);
    assert_eq!(auth.current_identity(&session), None);
    // Signing out an unknown session publishes nothing
    auth.sign_out(&session);

    assert_eq!(events.try_recv().unwrap(), AuthEvent::SignedIn(identity.clone()));
    assert_eq!(events.try_recv().unwrap(), AuthEvent::SignedOut(identity));
    assert!(events.try_recv().is_err());
}

#[test]
fn accounts_persist_in_the_users_file() {
    let dir = tempdir().unwrap();
    let users_file = dir.path().join("db").join("users.json");

    let identity = {
        let auth = AuthService::open(&users_file, TTL).unwrap();
        auth.sign_up("ana@example.com", "secret1").unwrap()
    };

    let contents = std::fs::read_to_string(&users_file).unwrap();
    assert!(contents.contains("ana@example.com"));
    assert!(!contents.contains("secret1"));

    let auth = AuthService::open(&users_file, TTL).unwrap();
    assert_eq!(auth.sign_in("ana@example.com", "secret1").unwrap(), identity);
}

#[tokio::test]
async fn federated_sign_in_creates_then_reuses_the_account() {
    let auth = federated_service("sub-42", "Ana@Example.com", false);

    let state = auth.begin_federated().unwrap();
    let first = auth.complete_federated("code-1", &state).await.unwrap();
    assert_eq!(first.email, "ana@example.com");

    let state = auth.begin_federated().unwrap();
    let second = auth.complete_federated("code-2", &state).await.unwrap();
    assert_eq!(second, first);

    // Federated-only accounts have no password to sign in with
    assert!(auth.sign_in("ana@example.com", "anything").is_err());
}

#[tokio::test]
async fn federated_sign_in_links_an_existing_password_account() {
    let auth = federated_service("sub-7", "ana@example.com", true);
    let password_identity = auth.sign_up("ana@example.com", "secret1").unwrap();

    let state = auth.begin_federated().unwrap();
    let identity = auth.complete_federated("code", &state).await.unwrap();

    assert_eq!(identity, password_identity);
    assert_eq!(auth.sign_in("ana@example.com", "secret1").unwrap(), password_identity);
}

#[tokio::test]
async fn federated_sign_in_never_links_an_unverified_email() {
    let auth = federated_service("sub-9", "ana@example.com", false);
    let password_identity = auth.sign_up("ana@example.com", "secret1").unwrap();

    let state = auth.begin_federated().unwrap();
    let err = auth.complete_federated("code", &state).await.unwrap_err();
    assert!(matches!(err, AuthError::UnverifiedEmail));

    // The password account is untouched
    assert_eq!(auth.sign_in("ana@example.com", "secret1").unwrap(), password_identity);
}

#[tokio::test]
async fn federated_state_is_single_use() {
    let auth = federated_service("sub-1", "ana@example.com", true);

    let err = auth.complete_federated("code", "forged").await.unwrap_err();
    assert!(matches!(err, AuthError::FederatedState));

    let state = auth.begin_federated().unwrap();
    let err = auth.complete_federated("bad", &state).await.unwrap_err();
    assert_eq!(err.to_string(), "Federated sign-in failed: invalid_grant");

    let err = auth.complete_federated("code", &state).await.unwrap_err();
    assert!(matches!(err, AuthError::FederatedState));
}

#[tokio::test]
async fn federated_requires_configuration() {
    let auth = AuthService::in_memory(TTL);
    assert!(auth.federated_config().is_none());
    assert!(matches!(
        auth.begin_federated().unwrap_err(),
        AuthError::FederatedUnavailable
    ));
    assert!(matches!(
        auth.complete_federated("code", "state").await.unwrap_err(),
        AuthError::FederatedUnavailable
    ));
}
