//! Wire types and configuration shared by the dmdj client crates.

pub mod config;
pub mod effect;
pub mod platform;
pub mod protocol;
