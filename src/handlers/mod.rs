mod forward;
mod health;
mod metrics;

pub use forward::{GUARDED_ROUTES, GuardedRoute, guarded};
pub use health::health_handler;
pub use metrics::metrics_handler;
