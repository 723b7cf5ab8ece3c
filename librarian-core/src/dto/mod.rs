//! Data transfer objects for the backend job endpoints
//!
//! Request and response bodies exchanged with the backend. Field names match
//! the JSON the backend produces and accepts.

pub mod run;
pub mod status;
