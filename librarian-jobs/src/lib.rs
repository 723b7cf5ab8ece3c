//! Librarian Jobs
//!
//! Client-side orchestration of the backend's long-running module jobs.
//!
//! Architecture:
//! - Registry: one execution record per module, observers notified on change
//! - Controller: start/cancel plus a status loop and an output loop per
//!   running module
//! - Scheduler: delayed continuations, on tokio or on a virtual clock
//! - Configuration: polling intervals and backoff bounds
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use librarian_client::LibrarianClient;
//! use librarian_core::domain::module::ModuleId;
//! use librarian_core::dto::run::RunPayload;
//! use librarian_jobs::{ControllerConfig, JobController, JobRegistry, RegistryEvent, TokioScheduler};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Arc::new(JobRegistry::new());
//!     registry.subscribe(|event| {
//!         if let RegistryEvent::Log(log) = event {
//!             println!("[{}] {}", log.module, log.message);
//!         }
//!     });
//!
//!     let controller = JobController::new(
//!         registry,
//!         Arc::new(LibrarianClient::new("http://localhost:8000")),
//!         Arc::new(TokioScheduler),
//!         ControllerConfig::default(),
//!     );
//!
//!     controller
//!         .start(ModuleId::Sort, RunPayload::sort("/library/inbox"))
//!         .await?;
//!     controller.wait_until_idle(ModuleId::Sort).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod registry;
pub mod scheduler;

pub use config::ControllerConfig;
pub use controller::{CancelOutcome, JobController};
pub use registry::{JobRegistry, RegistryEvent};
pub use scheduler::{LoopKey, LoopKind, ManualScheduler, Scheduler, TaskHandle, TokioScheduler};
