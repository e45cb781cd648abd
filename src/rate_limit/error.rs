use thiserror::Error;

use super::policy::PolicyClass;

pub type Result<T> = std::result::Result<T, AdmissionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The caller used up its quota for the current window.
    #[error("quota exceeded for {class} (limit {limit}), window resets at {reset_at}ms")]
    QuotaExceeded {
        class: PolicyClass,
        limit: u32,
        reset_at: u64,
    },

    /// Empty or malformed identity/key. A caller bug, never a shared bucket.
    #[error("invalid quota key: {0}")]
    InvalidKey(String),

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
}
