//! Process exit handling.
//!
//! Output written by handlers must not be lost when the peer stops the
//! process, so the first engine instance registers an `atexit` hook that
//! flushes stdout and stderr. The hook is registered once per process and
//! the flush runs at most once, no matter how many instances exist or
//! whether [`fatal`] already flushed.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use crate::error::ApiError;

/// Runs an action at most once.
#[derive(Debug, Default)]
pub struct FlushOnce {
    done: AtomicBool,
}

impl FlushOnce {
    /// Create a guard that has not run yet.
    pub const fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
        }
    }

    /// Run `action` unless it already ran; returns whether it ran now.
    pub fn run<F: FnOnce()>(&self, action: F) -> bool {
        if self.done.swap(true, Ordering::AcqRel) {
            return false;
        }
        action();
        true
    }

    /// Check if the action already ran.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

static REGISTER: Once = Once::new();
static FLUSH: FlushOnce = FlushOnce::new();

/// Flush stdout and stderr, once per process.
pub fn flush_standard_streams() -> bool {
    FLUSH.run(|| {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
    })
}

extern "C" fn flush_at_exit() {
    flush_standard_streams();
}

/// Register the process-wide flush hook; later calls do nothing.
pub fn register_flush_on_exit() {
    REGISTER.call_once(|| {
        // SAFETY: `flush_at_exit` is a plain `extern "C"` function that does
        // not unwind.
        let status = unsafe { libc::atexit(flush_at_exit) };
        if status != 0 {
            tracing::warn!("could not register exit flush hook");
        }
    });
}

/// Terminate the process after an unrecoverable protocol error.
pub fn fatal(error: &ApiError) -> ! {
    tracing::error!(code = error.code(), %error, "channel desynchronized, exiting");
    flush_standard_streams();
    std::process::exit(error.code())
}
