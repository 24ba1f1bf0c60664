//! Work Coordinator Module
//!
//! Hands out record ids to a small fleet of unreliable workers so that each id
//! is claimed by at most one of them, and pauses the whole fleet when the target
//! system starts rate limiting.
//!
//! ## Architecture Overview
//! The coordinator follows a **Pull-based** model with **Locks** and a **Scan Pointer**:
//! 1. **Assignment**: A worker calls `request_work`; the coordinator scans forward from the
//!    scan pointer, skipping completed ids and ids locked by someone else.
//! 2. **Locking**: The chosen id is locked for the caller and the pointer moves past it.
//! 3. **Release**: The worker reports `Success`, `NotFound` or `Empty`; the lock is dropped and
//!    successful ids enter the completed set.
//! 4. **Cooldown**: A throttle signal from any worker freezes the fleet, waits, then re-drives
//!    every worker back into its checkpoint.
//!
//! ## Submodules
//! - **`types`**: Registry documents, identities and directives.
//! - **`registry`**: The `Coordinator` itself (assignment, release, stop, membership).
//! - **`cooldown`**: The fleet-wide pause/resume protocol.
//! - **`mailbox`**: Per-worker directive channels with backoff delivery.

pub mod cooldown;
pub mod mailbox;
pub mod registry;
pub mod types;

pub use cooldown::{CooldownPhase, CooldownWindow};
pub use registry::Coordinator;

#[cfg(test)]
mod tests;
