//! Run-and-repair loop for build and run commands.
//!
//! A command is executed (or its stored result reused), and when it fails the
//! error output is handed to a suggestion agent. The suggested fix is applied
//! and the command retried until it succeeds or the attempt budget runs out.
//!
//! - **[`core`]**: Pure data and state: command specs, fingerprints, the
//!   per-phase loop state, suggestion types. No I/O.
//! - **[`io`]**: Processes, the result store, the agent, config, fix
//!   application. Each seam is a trait so tests can script it.
//!
//! [`engine`] drives one phase, [`workflow`] chains phases, and [`docker`]
//! builds the container workflow's commands.

pub mod console;
pub mod core;
pub mod docker;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod signals;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
