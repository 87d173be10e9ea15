//! Durable, versioned group policy and per-user state.
//!
//! The whole state lives in one JSON document that is normalized on load and
//! rewritten atomically after every state-changing mutation.

pub mod document;
pub mod error;
pub mod normalize;
pub mod store;

pub use document::*;
pub use error::{StoreError, StoreResult};
pub use store::Store;
