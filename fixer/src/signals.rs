//! Interrupt handling for the CLI.
//!
//! Store writes are staged and renamed into place, so exiting from the signal
//! thread at any point leaves either the old entry or the new one. Running
//! commands are killed with their process groups before the exit.

/// On SIGINT or SIGTERM, kill running commands and exit with
/// [`crate::exit_codes::INTERRUPTED`].
#[cfg(unix)]
pub fn install() {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use tracing::{error, info};

    use crate::exit_codes;
    use crate::io::process::kill_active_children;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(err) => {
            error!(err = %err, "failed to register signal handlers");
            return;
        }
    };
    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!(signal = sig, "interrupted");
            kill_active_children();
            eprintln!("\nInterrupted.");
            std::process::exit(exit_codes::INTERRUPTED);
        }
    });
}

#[cfg(not(unix))]
pub fn install() {}
