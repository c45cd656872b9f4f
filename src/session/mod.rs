//! Night session management.
//!
//! This module contains:
//! - `key`: rollover-hour bucketing of instants into session keys
//! - `config`: lifecycle configuration (rollover hour, cutoffs, timezone)
//! - `event`: events pushed to subscribers on every transition
//! - `lifecycle`: the engine that owns and mutates the session state

pub mod config;
pub mod event;
pub mod key;
pub mod lifecycle;

pub use config::SessionLifecycleConfig;
pub use event::SessionEvent;
pub use key::{session_date, session_key};
pub use lifecycle::SessionLifecycle;
