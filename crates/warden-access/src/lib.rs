//! Participant identity handling: canonical handles for the phone-number and
//! privacy-id namespaces, and the resolver that reconciles the two.

pub mod identity;
pub mod resolver;

pub use identity::*;
pub use resolver::*;
