//! Side-effecting collaborators of the fix loop.

pub mod apply;
pub mod attempt_log;
pub mod config;
pub mod confirm;
pub mod process;
pub mod prompt;
pub mod result_store;
pub mod runner;
pub mod suggest;
