//! Librarian Core
//!
//! Core types shared by the Librarian job orchestration crates.
//!
//! This crate contains:
//! - Domain types: modules, job records, log events
//! - DTOs: request and response bodies of the backend job endpoints

pub mod domain;
pub mod dto;
