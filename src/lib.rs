//! quota-gateway: per-identity admission control for expensive AI backends.
//!
//! The [`rate_limit`] module is the reusable part: a fixed-window
//! [`QuotaStore`](rate_limit::QuotaStore) and the
//! [`AdmissionGuard`](rate_limit::AdmissionGuard) that applies named policies
//! to it. The rest is an axum gateway that guards inference, speech and
//! transcription routes with that guard before forwarding them upstream.

pub mod config;
pub mod error;
pub mod handlers;
pub mod headers;
pub mod identity;
pub mod load_balancer;
pub mod metrics;
pub mod rate_limit;
pub mod router;
pub mod state;

pub use error::GatewayError;
pub use router::build_router;
pub use state::AppState;
