use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::error::{AdmissionError, Result};

pub const DEFAULT_WINDOW_MS: u64 = 60 * 60 * 1000;
pub const DEFAULT_AI_LIMIT: u32 = 100;
pub const DEFAULT_TRANSCRIBE_LIMIT: u32 = 50;
pub const DEFAULT_GENERAL_LIMIT: u32 = 200;

// Class of protected operation. Limits are per class, not per identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyClass {
    AiEndpoints,
    Transcribe,
    General,
}

impl PolicyClass {
    pub const ALL: [PolicyClass; 3] = [
        PolicyClass::AiEndpoints,
        PolicyClass::Transcribe,
        PolicyClass::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyClass::AiEndpoints => "AI_ENDPOINTS",
            PolicyClass::Transcribe => "TRANSCRIBE",
            PolicyClass::General => "GENERAL",
        }
    }
}

impl fmt::Display for PolicyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-window limit: at most `max_requests` per `window_ms` milliseconds.
/// Only `Policy::new` builds one, so both values are always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    max_requests: u32,
    window_ms: u64,
}

impl Policy {
    pub fn new(max_requests: u32, window: Duration) -> Result<Self> {
        let window_ms = u64::try_from(window.as_millis())
            .map_err(|_| AdmissionError::InvalidPolicy("window too large".to_string()))?;
        if max_requests == 0 {
            return Err(AdmissionError::InvalidPolicy(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if window_ms == 0 {
            return Err(AdmissionError::InvalidPolicy(
                "window must be at least one millisecond".to_string(),
            ));
        }
        Ok(Self {
            max_requests,
            window_ms,
        })
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }
}

// Static class -> policy table. Built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRegistry {
    ai_endpoints: Policy,
    transcribe: Policy,
    general: Policy,
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        let hour = |max_requests| Policy {
            max_requests,
            window_ms: DEFAULT_WINDOW_MS,
        };
        Self {
            ai_endpoints: hour(DEFAULT_AI_LIMIT),
            transcribe: hour(DEFAULT_TRANSCRIBE_LIMIT),
            general: hour(DEFAULT_GENERAL_LIMIT),
        }
    }
}

impl PolicyRegistry {
    pub fn new(ai_endpoints: Policy, transcribe: Policy, general: Policy) -> Self {
        Self {
            ai_endpoints,
            transcribe,
            general,
        }
    }

    pub fn with(mut self, class: PolicyClass, policy: Policy) -> Self {
        match class {
            PolicyClass::AiEndpoints => self.ai_endpoints = policy,
            PolicyClass::Transcribe => self.transcribe = policy,
            PolicyClass::General => self.general = policy,
        }
        self
    }

    pub fn resolve(&self, class: PolicyClass) -> Policy {
        match class {
            PolicyClass::AiEndpoints => self.ai_endpoints,
            PolicyClass::Transcribe => self.transcribe,
            PolicyClass::General => self.general,
        }
    }
}
