use std::sync::Arc;
use tracing::{debug, warn};

use super::error::{AdmissionError, Result};
use super::policy::{PolicyClass, PolicyRegistry};
use super::store::QuotaBackend;
use crate::metrics::ADMISSIONS_TOTAL;

/// What the caller must do with a protected operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub class: PolicyClass,
    pub limit: u32,
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: u64, // epoch ms
}

impl Decision {
    /// Reset time as whole epoch seconds, rounded up so clients never retry early.
    pub fn reset_at_secs(&self) -> u64 {
        self.reset_at.div_ceil(1000)
    }
}

/// Applies a named policy to a caller identity.
///
/// Denials are final for the current window: no retry, no queueing.
#[derive(Clone)]
pub struct AdmissionGuard {
    backend: Arc<dyn QuotaBackend>,
    policies: PolicyRegistry,
}

impl AdmissionGuard {
    pub fn new(backend: Arc<dyn QuotaBackend>, policies: PolicyRegistry) -> Self {
        Self { backend, policies }
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    pub fn tracked_keys(&self) -> usize {
        self.backend.tracked_keys()
    }

    pub fn check(&self, identity: &str, class: PolicyClass) -> Result<Decision> {
        if identity.trim().is_empty() {
            warn!(%class, "Rejected admission check with empty identity");
            return Err(AdmissionError::InvalidKey(format!(
                "empty identity for {class}"
            )));
        }

        let policy = self.policies.resolve(class);
        let key = format!("{identity}:{class}");
        let check = self.backend.check(&key, &policy)?;

        let outcome = if check.allowed { "allowed" } else { "denied" };
        ADMISSIONS_TOTAL
            .with_label_values(&[class.as_str(), outcome])
            .inc();

        Ok(Decision {
            class,
            limit: policy.max_requests(),
            allowed: check.allowed,
            remaining: check.remaining,
            reset_at: check.reset_at,
        })
    }

    // Like `check`, but a denial comes back as `QuotaExceeded`.
    pub fn admit(&self, identity: &str, class: PolicyClass) -> Result<Decision> {
        let decision = self.check(identity, class)?;
        if !decision.allowed {
            debug!(identity, %class, reset_at = decision.reset_at, "Quota exceeded");
            return Err(AdmissionError::QuotaExceeded {
                class,
                limit: decision.limit,
                reset_at: decision.reset_at,
            });
        }
        Ok(decision)
    }
}
