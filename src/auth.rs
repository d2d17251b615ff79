//! Credential schemes, token bundles, and secret wrappers.

pub mod scheme;
pub mod secret;
pub mod token;

pub use scheme::*;
pub use secret::*;
pub use token::*;
