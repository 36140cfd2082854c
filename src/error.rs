//! Error types shared by the store, the auth service and the web layer.

use thiserror::Error;

/// Failures raised by a [`DocumentStore`](crate::store::DocumentStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// The addressed document does not exist (update on a missing document)
    #[error("document not found: {0}")]
    NotFound(String),

    /// A path segment was empty or contained a separator
    #[error("invalid path segment: {0:?}")]
    InvalidPath(String),

    /// A lock guarding the store was poisoned by a panicking writer
    #[error("store lock poisoned")]
    Poisoned,

    /// Reading or writing the on-disk snapshot failed
    #[error("snapshot I/O failed: {0}")]
    Snapshot(#[from] std::io::Error),
}

/// Failures raised by the auth service.
///
/// The `Display` text of every variant is shown verbatim on the login view.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Email and password are required")]
    MissingCredentials,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("An account with this email already exists")]
    EmailInUse,

    #[error("Password should be at least {0} characters")]
    WeakPassword(usize),

    #[error("Federated sign-in is not configured")]
    FederatedUnavailable,

    #[error("Federated sign-in expired or was not started here, please try again")]
    FederatedState,

    #[error("An account with this email already exists; the provider did not verify the email")]
    UnverifiedEmail,

    #[error("Federated sign-in failed: {0}")]
    Exchange(String),

    #[error("Account storage error: {0}")]
    Storage(String),
}

/// Failures while building an [`AppConfig`](crate::config::AppConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("incomplete federated sign-in settings, missing {0}")]
    IncompleteFederated(&'static str),
}

/// Umbrella error for tracker operations and request handlers.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("template rendering failed: {0}")]
    Render(String),
}

/// Result type alias for tracker operations
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(feature = "web")]
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            AppError::Store(StoreError::NotFound(_)) | AppError::Store(StoreError::InvalidPath(_)) => {
                StatusCode::NOT_FOUND
            }
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            log::error!("request failed: {}", self);
        } else {
            log::warn!("request rejected: {}", self);
        }

        (status, self.to_string()).into_response()
    }
}
