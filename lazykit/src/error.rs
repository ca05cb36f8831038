//! One error enum for the whole engine. Callers match on the kind; the CLI
//! renders it into the selected output shape.

use thiserror::Error;

use crate::abi::RevertInfo;

#[derive(Debug, Error)]
pub enum KitError {
    #[error("bad identifier: {0}")]
    BadIdentifier(String),

    #[error("abi encode failed for `{function}`: {reason}")]
    AbiEncode { function: String, reason: String },

    #[error("abi decode failed ({context}): {reason}")]
    AbiDecode { context: String, reason: String },

    #[error("mirror unavailable after {attempts} attempts: {reason}")]
    MirrorUnavailable { attempts: u32, reason: String },

    #[error("insufficient balance of {token}: required {required}, available {available}")]
    InsufficientBalance { token: String, required: u128, available: u128 },

    #[error("insufficient allowance of {token} to {spender}: required {required}, available {available}")]
    InsufficientAllowance { token: String, spender: String, required: u128, available: u128 },

    #[error("operator is not associated with token {token}")]
    NotAssociated { token: String },

    #[error("operator does not own serial {serial} of {token}")]
    NotOwner { token: String, serial: u64 },

    #[error("submit rejected pre-consensus: {status}")]
    SubmitFailed { status: String },

    #[error("execution failed with status {status}{}", revert.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    ExecutionFailed { status: String, revert: Option<RevertInfo> },

    #[error("signature threshold not met: have {have} distinct signers, need {need}")]
    ThresholdNotMet { have: usize, need: usize },

    #[error("duplicate signer {fingerprint}")]
    DuplicateSigner { fingerprint: String },

    #[error("artifact validity window has passed (valid start {valid_start_unix_nanos})")]
    ArtifactExpired { valid_start_unix_nanos: u64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("cancelled by user")]
    UserCancelled,

    #[error("environment: {0}")]
    Env(String),

    #[error("{context}: {source}")]
    Context { context: String, #[source] source: Box<KitError> },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl KitError {
    /// Wrap with the step that failed (which preflight condition, which
    /// target spender, ...). Lower layers surface their kind untouched.
    pub fn context(self, context: impl Into<String>) -> Self {
        KitError::Context { context: context.into(), source: Box::new(self) }
    }

    /// The kind that survives context wrapping, for exit-path decisions.
    pub fn root(&self) -> &KitError {
        match self {
            KitError::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type KitResult<T> = Result<T, KitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_preserves_root_kind() {
        let err = KitError::UserCancelled.context("preflight: allowance for 0.0.1234");
        assert!(matches!(err.root(), KitError::UserCancelled));
        assert!(err.to_string().contains("preflight"));
    }
}
