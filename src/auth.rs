//! Provider credentials, bearer tokens, and the single-flight token manager.

pub mod manager;
pub mod secret;
pub mod token;

pub use manager::*;
pub use secret::*;
pub use token::*;
