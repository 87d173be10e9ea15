//! Foundational low-level utilities shared across Warden crates.
//!
//! Provides atomic file-write helpers, time utilities used by mute expiry and
//! cooldown math, and the self-bounding caches behind rate limiting.

pub mod atomic_io;
pub mod bounded_cache;
pub mod time_utils;

pub use atomic_io::{ensure_private_dir, write_text_atomic};
pub use bounded_cache::{StampCache, TtlCache};
pub use time_utils::{current_unix_timestamp_ms, is_expired_ms, wait_seconds_ceil};
