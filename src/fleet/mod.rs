//! Fleet Module
//!
//! Runs the workers of this process and exposes the control plane.
//!
//! ## Submodules
//! - **`runner`**: `Fleet`, which launches staggered worker tasks, recreates them
//!   in place, and waits for them to finish.
//! - **`handlers`**: axum handlers for start / stop / resume / status.
//! - **`protocol`**: request and response DTOs plus endpoint paths.

pub mod handlers;
pub mod protocol;
pub mod runner;

pub use runner::Fleet;
