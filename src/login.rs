use crate::error::AuthError;
use crate::federated::{CodeExchange, FederatedConfig, FederatedIdentity};
use crate::store::generate_token;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Minimum password length accepted on sign-up
pub const MIN_PASSWORD_LEN: usize = 6;

const FEDERATED_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// How an account signs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignInMethod {
    Password,
    Federated,
}

/// Registered account
///
/// Accounts are keyed by their lower-cased email address.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    /// Stable identifier used as the owner of created projects
    pub uid: String,

    /// Email address, lower-cased
    pub email: String,

    /// Argon2 hash of the password; `None` for federated-only accounts
    pub password_hash: Option<String>,

    pub method: SignInMethod,

    /// Subject asserted by the federated provider, when linked
    #[serde(default)]
    pub federated_subject: Option<String>,
}

/// The signed-in user as seen by request handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: String,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Identity {
            uid: user.uid.clone(),
            email: user.email.clone(),
        }
    }
}

/// Session state change published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Identity),
    SignedOut(Identity),
}

/// User session data
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,

    /// Time when the session expires
    pub expires_at: SystemTime,
}

/// Accounts held in memory and mirrored to a JSON file when one is configured.
#[derive(Debug, Default)]
struct UserDirectory {
    users: RwLock<HashMap<String, User>>,
    file: Option<PathBuf>,
}

impl UserDirectory {
    /// Load accounts from `path`, creating an empty users file if missing.
    fn open(path: &Path) -> Result<Self, AuthError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AuthError::Storage(e.to_string()))?;
        }

        if !path.exists() {
            let mut file = File::create(path).map_err(|e| AuthError::Storage(e.to_string()))?;
            file.write_all(b"{}")
                .map_err(|e| AuthError::Storage(e.to_string()))?;
        }

        let mut contents = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(|e| AuthError::Storage(format!("failed to read users file: {}", e)))?;

        let users: HashMap<String, User> = serde_json::from_str(&contents)
            .map_err(|e| AuthError::Storage(format!("failed to parse users file: {}", e)))?;
        log::info!("loaded {} accounts from {}", users.len(), path.display());

        Ok(UserDirectory {
            users: RwLock::new(users),
            file: Some(path.to_path_buf()),
        })
    }

    fn find(&self, email: &str) -> Result<Option<User>, AuthError> {
        let users = self.users.read().map_err(|_| poisoned())?;
        Ok(users.get(email).cloned())
    }

    /// Add `user` unless its email is already registered.
    fn insert_new(&self, user: User) -> Result<(), AuthError> {
        let mut users = self.users.write().map_err(|_| poisoned())?;
        let email = user.email.clone();
        match users.entry(email.clone()) {
            Entry::Occupied(_) => return Err(AuthError::EmailInUse),
            Entry::Vacant(slot) => {
                slot.insert(user);
            }
        }

        if let Err(err) = self.save(&users) {
            users.remove(&email);
            return Err(err);
        }
        Ok(())
    }

    /// Find or create the account for a federated assertion in one step.
    ///
    /// An existing account is linked by email only when the provider
    /// asserts the email as verified.
    fn link_federated(&self, asserted: FederatedIdentity) -> Result<User, AuthError> {
        let mut users = self.users.write().map_err(|_| poisoned())?;

        if let Some(user) = users
            .values()
            .find(|u| u.federated_subject.as_deref() == Some(asserted.subject.as_str()))
        {
            return Ok(user.clone());
        }

        let email = normalize_email(&asserted.email);
        let user = match users.get(&email) {
            Some(_) if !asserted.email_verified => return Err(AuthError::UnverifiedEmail),
            Some(existing) => User {
                federated_subject: Some(asserted.subject),
                ..existing.clone()
            },
            None => User {
                uid: Uuid::new_v4().simple().to_string(),
                email: email.clone(),
                password_hash: None,
                method: SignInMethod::Federated,
                federated_subject: Some(asserted.subject),
            },
        };

        let previous = users.insert(email.clone(), user.clone());
        if let Err(err) = self.save(&users) {
            match previous {
                Some(previous) => users.insert(email, previous),
                None => users.remove(&email),
            };
            return Err(err);
        }
        Ok(user)
    }

    fn save(&self, users: &HashMap<String, User>) -> Result<(), AuthError> {
        let Some(path) = &self.file else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(users)
            .map_err(|_| AuthError::Storage("failed to serialize users".to_string()))?;
        fs::write(path, json).map_err(|e| AuthError::Storage(e.to_string()))
    }
}

fn poisoned() -> AuthError {
    AuthError::Storage("account lock poisoned".to_string())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Hash a password using Argon2
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    match argon2.hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(_) => Err(AuthError::Storage("password hashing failed".to_string())),
    }
}

/// Verify a password against a stored hash
fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(_) => return Err(AuthError::Storage("invalid password hash format".to_string())),
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false), // Password didn't match
    }
}

struct FederatedLogin {
    config: FederatedConfig,
    exchange: Arc<dyn CodeExchange>,
    pending: RwLock<HashMap<String, SystemTime>>,
}

/// Accounts, sessions and sign-in flows.
///
/// Constructed once at startup and shared by every request handler.
pub struct AuthService {
    users: UserDirectory,
    sessions: RwLock<HashMap<String, Session>>,
    session_ttl: Duration,
    events: broadcast::Sender<AuthEvent>,
    federated: Option<FederatedLogin>,
}

impl AuthService {
    /// A service whose accounts live only in memory.
    pub fn in_memory(session_ttl: Duration) -> Self {
        Self::with_directory(UserDirectory::default(), session_ttl)
    }

    /// A service whose accounts are persisted to `users_file`.
    pub fn open(users_file: impl AsRef<Path>, session_ttl: Duration) -> Result<Self, AuthError> {
        let users = UserDirectory::open(users_file.as_ref())?;
        Ok(Self::with_directory(users, session_ttl))
    }

    fn with_directory(users: UserDirectory, session_ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        AuthService {
            users,
            sessions: RwLock::new(HashMap::new()),
            session_ttl,
            events,
            federated: None,
        }
    }

    /// Enable federated sign-in through `exchange`.
    pub fn with_federated(mut self, config: FederatedConfig, exchange: Arc<dyn CodeExchange>) -> Self {
        self.federated = Some(FederatedLogin {
            config,
            exchange,
            pending: RwLock::new(HashMap::new()),
        });
        self
    }

    pub fn federated_config(&self) -> Option<&FederatedConfig> {
        self.federated.as_ref().map(|f| &f.config)
    }

    /// Receive every sign-in and sign-out from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: AuthEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Register a new email/password account.
    pub fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword(MIN_PASSWORD_LEN));
        }
        let user = User {
            uid: Uuid::new_v4().simple().to_string(),
            email,
            password_hash: Some(hash_password(password)?),
            method: SignInMethod::Password,
            federated_subject: None,
        };
        let identity = Identity::from(&user);
        self.users.insert_new(user)?;

        log::info!("registered account {}", identity.uid);
        Ok(identity)
    }

    /// Check email/password credentials.
    pub fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let user = self.users.find(&email)?.ok_or(AuthError::InvalidCredentials)?;
        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;

        if verify_password(password, hash)? {
            Ok(Identity::from(&user))
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    /// Start a federated sign-in and return the one-time state to send along.
    pub fn begin_federated(&self) -> Result<String, AuthError> {
        let federated = self
            .federated
            .as_ref()
            .ok_or(AuthError::FederatedUnavailable)?;

        let state = generate_token(32);
        let mut pending = federated.pending.write().map_err(|_| poisoned())?;
        let now = SystemTime::now();
        pending.retain(|_, expires| *expires > now);
        pending.insert(state.clone(), now + FEDERATED_STATE_TTL);

        Ok(state)
    }

    /// Finish a federated sign-in started by [`AuthService::begin_federated`].
    ///
    /// The account is looked up by provider subject, then by verified email,
    /// and created when neither matches.
    pub async fn complete_federated(&self, code: &str, state: &str) -> Result<Identity, AuthError> {
        let federated = self
            .federated
            .as_ref()
            .ok_or(AuthError::FederatedUnavailable)?;

        let expires = {
            let mut pending = federated.pending.write().map_err(|_| poisoned())?;
            pending.remove(state)
        };
        match expires {
            Some(expires) if expires > SystemTime::now() => {}
            _ => return Err(AuthError::FederatedState),
        }

        let asserted = federated.exchange.exchange(code).await?;
        let user = self.users.link_federated(asserted)?;
        Ok(Identity::from(&user))
    }

    /// Create a session for `identity` and return its id.
    pub fn start_session(&self, identity: &Identity) -> Result<String, AuthError> {
        let session_id = Uuid::new_v4().to_string();
        let session = Session {
            identity: identity.clone(),
            expires_at: SystemTime::now() + self.session_ttl,
        };

        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        let now = SystemTime::now();
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(session_id.clone(), session);
        drop(sessions);

        self.publish(AuthEvent::SignedIn(identity.clone()));
        Ok(session_id)
    }

    /// The identity behind a session, if it exists and has not expired.
    pub fn current_identity(&self, session_id: &str) -> Option<Identity> {
        let sessions = self.sessions.read().ok()?;
        sessions
            .get(session_id)
            .filter(|s| s.expires_at > SystemTime::now())
            .map(|s| s.identity.clone())
    }

    pub fn sign_out(&self, session_id: &str) {
        let removed = match self.sessions.write() {
            Ok(mut sessions) => sessions.remove(session_id),
            Err(_) => None,
        };
        if let Some(session) = removed {
            self.publish(AuthEvent::SignedOut(session.identity));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }

    #[test]
    fn emails_are_case_insensitive() {
        let auth = AuthService::in_memory(Duration::from_secs(60));
        let id = auth.sign_up(" Ana@Example.com", "secret1").unwrap();
        assert_eq!(id.email, "ana@example.com");
        assert_eq!(auth.sign_in("ANA@example.com", "secret1").unwrap(), id);
    }

    #[test]
    fn expired_sessions_are_evicted_on_sign_in() {
        let auth = AuthService::in_memory(Duration::from_secs(0));
        let id = auth.sign_up("a@b.c", "secret1").unwrap();
        for _ in 0..5 {
            auth.start_session(&id).unwrap();
        }

        // Only the session just started is left
        assert_eq!(auth.sessions.read().unwrap().len(), 1);
    }

    #[test]
    fn expired_session_is_rejected() {
        let auth = AuthService::in_memory(Duration::from_secs(0));
        let id = auth.sign_up("a@b.c", "secret1").unwrap();
        let session = auth.start_session(&id).unwrap();
        assert_eq!(auth.current_identity(&session), None);
    }
}
