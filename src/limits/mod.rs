//! Rate limiting and daily quotas.

pub mod gate;
pub mod plans;
pub mod rate;
pub mod usage;

pub use gate::QuotaGate;
pub use plans::{PlanLimits, PlanTable, Tier, UsageKind};
pub use rate::RateLimiter;
