//! Types shared by the authed-fetch workspace crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
