//! Per-identity admission control.
//!
//! `QuotaStore` holds fixed-window counters; `AdmissionGuard` maps a policy
//! class to a limit and asks the store whether a caller may proceed.

pub mod clock;
pub mod error;
pub mod guard;
pub mod policy;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::AdmissionError;
pub use guard::{AdmissionGuard, Decision};
pub use policy::{Policy, PolicyClass, PolicyRegistry};
pub use store::{QuotaBackend, QuotaCheck, QuotaRecord, QuotaStore};
