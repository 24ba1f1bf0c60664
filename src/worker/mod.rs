//! Resumable Worker Module
//!
//! A worker pulls record ids from the coordinator and drives each one through
//! a fixed pipeline against the target system, producing one artifact per
//! sub-item.
//!
//! ## Key Concepts
//! - **Checkpoint**: the phase about to run plus the remaining sub-items, stored
//!   per execution context. A worker task can be destroyed at any await point
//!   and a new task in the same context continues from the checkpoint.
//! - **Idempotence check**: before any fetch-side action the worker asks the
//!   retrieval service whether the artifact is already stored, so resuming
//!   never downloads twice.
//! - **Suspension points**: every wait goes through `Signals`, which honours
//!   `Halt`, the stop flag and fleet-wide pauses.
//!
//! ## Submodules
//! - **`machine`**: the `Worker` pipeline and its recovery rules.
//! - **`signals`**: mailbox and flag checks around every wait.
//! - **`checkpoint`**: checkpoint persistence.
//! - **`errors`**: `WorkerError`.
//! - **`types`**: `Phase`, `Checkpoint`, `WorkerExit`.

pub mod checkpoint;
pub mod errors;
pub mod machine;
pub mod signals;
pub mod types;

pub use errors::WorkerError;
pub use machine::Worker;
pub use types::{Checkpoint, Phase, SubItemStep, WorkerExit};
