use jacquard_common::session::SessionStoreError;
use miette::Diagnostic;

use crate::request::RequestError;
use crate::resolver::ResolverError;
use crate::retry::Retryable;

/// High-level errors emitted by OAuth helpers.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum OAuthError {
    #[error(transparent)]
    #[diagnostic(code(jacquard_oauth::resolver))]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    #[diagnostic(code(jacquard_oauth::request))]
    Request(#[from] RequestError),

    #[error(transparent)]
    #[diagnostic(code(jacquard_oauth::storage))]
    Storage(#[from] SessionStoreError),

    #[error(transparent)]
    #[diagnostic(code(jacquard_oauth::dpop))]
    Dpop(#[from] crate::dpop::Error),

    #[error(transparent)]
    #[diagnostic(code(jacquard_oauth::keyset))]
    Keyset(#[from] crate::keyset::Error),

    #[error(transparent)]
    #[diagnostic(code(jacquard_oauth::atproto))]
    Atproto(#[from] crate::atproto::Error),

    #[error(transparent)]
    #[diagnostic(code(jacquard_oauth::session))]
    Session(#[from] crate::session::Error),

    #[error(transparent)]
    #[diagnostic(code(jacquard_oauth::serde_json))]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(jacquard_oauth::url))]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    #[diagnostic(code(jacquard_oauth::form))]
    Form(#[from] serde_html_form::ser::Error),

    #[error(transparent)]
    #[diagnostic(code(jacquard_oauth::callback))]
    Callback(#[from] CallbackError),

    #[error(transparent)]
    #[diagnostic(code(jacquard_oauth::storage))]
    StorageBackend(#[from] crate::storage::StorageError),

    #[error(transparent)]
    #[diagnostic(code(jacquard_oauth::crypto))]
    Crypto(#[from] crate::crypto::Error),

    #[error(transparent)]
    #[diagnostic(code(jacquard_oauth::envelope))]
    Envelope(#[from] crate::envelope::Error),

    #[error(transparent)]
    #[diagnostic(code(jacquard_oauth::config))]
    Config(#[from] crate::config::Error),

    #[error(transparent)]
    #[diagnostic(code(jacquard_oauth::pkce))]
    Pkce(#[from] crate::pkce::Error),

    #[error(transparent)]
    #[diagnostic(code(jacquard_oauth::origin))]
    Origin(#[from] crate::origin::Error),
}

impl crate::retry::Retryable for OAuthError {
    /// Only a transport/DPoP/5xx failure from [`RequestError`] is worth another
    /// attempt; every other variant reflects a local or permanent condition.
    fn retry_possible(&self) -> bool {
        match self {
            OAuthError::Request(e) => e.retry_possible(),
            _ => false,
        }
    }
}

/// Typed callback validation errors (redirect handling).
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum CallbackError {
    #[error("missing state parameter in callback")] 
    #[diagnostic(code(jacquard_oauth::callback::missing_state))]
    MissingState,
    #[error("missing `iss` parameter")] 
    #[diagnostic(code(jacquard_oauth::callback::missing_iss))]
    MissingIssuer,
    #[error("issuer mismatch: expected {expected}, got {got}")]
    #[diagnostic(code(jacquard_oauth::callback::issuer_mismatch))]
    IssuerMismatch { expected: String, got: String },
    #[error("subject mismatch: session is bound to {expected}, token set names {got}")]
    #[diagnostic(code(jacquard_oauth::callback::subject_mismatch))]
    SubjectMismatch { expected: String, got: String },
}

pub type Result<T> = core::result::Result<T, OAuthError>;
