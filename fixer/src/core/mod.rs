//! Deterministic, pure logic shared by the fix loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod error_context;
pub mod fingerprint;
pub mod loop_state;
pub mod suggestion;
pub mod types;
