// ============================================
// File: crates/burrow-server/src/handlers/mod.rs
// ============================================
//! # Request Handlers
//!
//! Per-session data plane tasks.

pub mod worker;

pub use worker::{SessionWorker, WorkerExit, WorkerSchedule};
