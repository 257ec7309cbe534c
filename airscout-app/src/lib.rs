//! Configuration loading and the batch driver behind the `airscout` binary.

pub mod config;
pub mod workflow;
