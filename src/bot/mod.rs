//! Bot module - Core bot functionality.

pub mod broadcast;
pub mod dispatcher;
mod health;
mod runtime;
pub mod scheduler;
pub mod webhook;

pub use dispatcher::{AppState, build_dispatcher};
pub use runtime::run;
pub use scheduler::ReminderScheduler;
