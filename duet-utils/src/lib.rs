//! Helpers for application code running on the `duet` user context.

pub mod delay;
pub mod futures;
