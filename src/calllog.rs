//! Persisted outbound call logs and the retry state machine that drives them.

pub mod machine;
pub mod record;

pub use machine::*;
pub use record::*;
