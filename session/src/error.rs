//! Identity-provider error taxonomy.
//!
//! ERROR HANDLING
//! ==============
//! The controller never surfaces these to the UI: a failed probe degrades to
//! an anonymous session. They exist so callers like the CLI and the usage API
//! can report what actually went wrong.

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("identity provider request failed: {0}")]
    Transport(String),
    #[error("identity provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("identity provider response decode failed: {0}")]
    Decode(String),
    #[error("no active session")]
    NoSession,
}

impl ProviderError {
    /// Whether the provider rejected the credentials or token outright.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401 | 403, .. })
    }
}
