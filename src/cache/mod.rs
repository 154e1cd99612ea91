//! Named in-memory caches backed by Moka.
//!
//! Repositories fetch their caches from a shared `CacheRegistry` by name,
//! so every component that asks for `"profiles"` sees the same entries.
//!
//! ```rust,ignore
//! let profiles = registry.get_or_create::<u64, UserProfile>("profiles", CacheConfig::profiles());
//! profiles.insert(user_id, profile);
//! ```

mod config;
mod registry;
mod typed;

pub use config::CacheConfig;
pub use registry::CacheRegistry;
pub use typed::TypedCache;
