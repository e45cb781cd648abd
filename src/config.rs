use clap::Parser;
use std::time::Duration;

use crate::rate_limit::policy::{
    DEFAULT_AI_LIMIT, DEFAULT_GENERAL_LIMIT, DEFAULT_TRANSCRIBE_LIMIT, DEFAULT_WINDOW_MS,
};
use crate::rate_limit::store::DEFAULT_HIGH_WATER_MARK;
use crate::rate_limit::{Policy, PolicyClass, PolicyRegistry, error::Result};

const DEFAULT_WINDOW_SECS: u64 = DEFAULT_WINDOW_MS / 1000;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "quota-gateway")]
#[command(about = "Per-identity admission control in front of AI backends")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Backend servers (comma-separated)
    // Example: "localhost:11434,localhost:11435"
    #[arg(short, long, default_value = "localhost:11434")]
    pub backends: String,

    // Health check interval in seconds (tokio intervals can't be zero)
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub health_interval: u64,

    // Inference and speech synthesis: max requests per window
    #[arg(long, default_value_t = DEFAULT_AI_LIMIT)]
    pub ai_limit: u32,

    #[arg(long, default_value_t = DEFAULT_WINDOW_SECS)]
    pub ai_window: u64,

    // Transcription: max requests per window
    #[arg(long, default_value_t = DEFAULT_TRANSCRIBE_LIMIT)]
    pub transcribe_limit: u32,

    #[arg(long, default_value_t = DEFAULT_WINDOW_SECS)]
    pub transcribe_window: u64,

    // Everything else behind the guard
    #[arg(long, default_value_t = DEFAULT_GENERAL_LIMIT)]
    pub general_limit: u32,

    #[arg(long, default_value_t = DEFAULT_WINDOW_SECS)]
    pub general_window: u64,

    // Count callers by x-user-id / x-forwarded-for / x-real-ip. Only safe
    // behind an auth proxy that sets or strips them; otherwise the peer address
    #[arg(long, default_value_t = false)]
    pub trust_identity_headers: bool,

    // Tracked-key count that triggers a sweep of expired records
    #[arg(long, default_value_t = DEFAULT_HIGH_WATER_MARK)]
    pub sweep_threshold: usize,
}

impl Args {
    /// Build the policy table, rejecting zero limits or windows.
    pub fn policy_registry(&self) -> Result<PolicyRegistry> {
        let policy = |limit, window_secs| Policy::new(limit, Duration::from_secs(window_secs));

        Ok(PolicyRegistry::default()
            .with(PolicyClass::AiEndpoints, policy(self.ai_limit, self.ai_window)?)
            .with(
                PolicyClass::Transcribe,
                policy(self.transcribe_limit, self.transcribe_window)?,
            )
            .with(
                PolicyClass::General,
                policy(self.general_limit, self.general_window)?,
            ))
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval)
    }
}
