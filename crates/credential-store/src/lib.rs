//! Persisted access/refresh credential pair
//!
//! The store is a small JSON key-value file (string keys, string values, the
//! same shape a browser key-value store would hold). The credential lives under
//! a single key as serialized JSON. Only the refresh coordinator writes it; the
//! request pipeline reads it before every authenticated call.

pub mod credential;
pub mod error;
pub mod store;

pub use credential::Credential;
pub use error::{Error, Result};
pub use store::{CREDENTIAL_KEY, CredentialStore};
