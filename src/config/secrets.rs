//! Secret handling utilities.
//!
//! Re-exports secrecy types so callers holding a [`Config`](super::Config)
//! can expose the database URL without a direct secrecy dependency.

pub use secrecy::{ExposeSecret, SecretString};
