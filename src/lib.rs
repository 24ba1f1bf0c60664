//! Work Fleet Library
//!
//! Spreads a large, enumerable batch job (records `1..N`, `N` unknown) over a
//! small fleet of unreliable workers.
//!
//! ## Architecture Modules
//! - **`coordinator`**: The work registry. Hands out ids under per-item locks,
//!   keeps the scan pointer and the completed set, and runs the fleet-wide
//!   cooldown when the target starts rate limiting.
//! - **`worker`**: The resumable worker state machine. Every step is
//!   checkpointed so a recreated worker continues where the old one stopped.
//! - **`fleet`**: Launches worker tasks and serves the HTTP control plane.
//! - **`collaborators`**: Traits for the target system (inspection, retrieval,
//!   authentication) and a scripted implementation of them.
//! - **`store`**: The persistent key/value store every component shares.
//! - **`config`** / **`events`**: Timing constants and status events.

pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod fleet;
pub mod store;
pub mod worker;
