//! Interrupt handling for graceful shutdown
//!
//! The first Ctrl+C sets the interrupted flag and cancels the shutdown token,
//! which stops the engine and every in-flight shot. A second Ctrl+C exits
//! immediately.

use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;
use tokio_util::sync::CancellationToken;

use crate::status::ExitStatus;

/// Global flag for Ctrl+C interrupt handling
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

static SHUTDOWN: Lazy<CancellationToken> = Lazy::new(CancellationToken::new);

/// Check if the application was interrupted (Ctrl+C pressed)
#[inline]
pub fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Set the interrupted flag and cancel the shutdown token
pub fn set_interrupted() {
    INTERRUPTED.store(true, Ordering::SeqCst);
    SHUTDOWN.cancel();
}

/// Token cancelled on the first interrupt
pub fn shutdown_token() -> CancellationToken {
    SHUTDOWN.clone()
}

/// Install the process-wide Ctrl+C handler
pub fn install_handler() -> Result<(), ctrlc::Error> {
    static SECOND_CTRL_C: AtomicBool = AtomicBool::new(false);

    ctrlc::set_handler(move || {
        set_interrupted();
        eprintln!("\nInterrupted, waiting for in-flight shots (Ctrl+C again to exit)");

        if SECOND_CTRL_C.swap(true, Ordering::SeqCst) {
            std::process::exit(ExitStatus::Interrupted as i32);
        }
    })
}
