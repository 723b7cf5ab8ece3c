//! Core domain types
//!
//! These types describe the background modules the backend can run and the
//! per-module execution record tracked by the job registry.

pub mod job;
pub mod log;
pub mod module;
