//! Host-termination cleanup hook.
//!
//! A running backend child must never be orphaned: whatever path the host
//! process takes out (normal quit, SIGINT, SIGTERM), the supervisor gets a
//! chance to signal the child first. Normal quits are covered by the
//! supervisor's `Drop`; this guard covers the signal paths.

#[cfg(unix)]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(unix)]
use std::sync::Arc;
#[cfg(unix)]
use std::thread::{self, JoinHandle};

#[cfg(unix)]
use signal_hook::iterator::Signals;

#[cfg(unix)]
use crate::supervisor::ProcessSupervisor;

/// Signal handler guard; uninstalls the handler and joins its thread on drop.
#[cfg(unix)]
pub struct ShutdownGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<JoinHandle<()>>,
}

#[cfg(unix)]
impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Install a SIGINT/SIGTERM hook that stops the supervised backend, then
/// re-raises the signal so the host exits with conventional semantics.
#[cfg(unix)]
pub fn install_shutdown_guard(supervisor: Arc<ProcessSupervisor>) -> ShutdownGuard {
    let ran = Arc::new(AtomicBool::new(false));
    let mut signals = Signals::new([libc::SIGINT, libc::SIGTERM])
        .expect("failed to register shutdown signal handlers");
    let handle = signals.handle();

    let thread = thread::spawn(move || {
        for signal in signals.forever() {
            if !ran.swap(true, Ordering::SeqCst) {
                log::info!("received signal {signal}; stopping backend before exit");
                supervisor.stop();
                // Restore default disposition and re-raise so the exit
                // status reflects the signal.
                unsafe {
                    libc::signal(signal, libc::SIG_DFL);
                    libc::raise(signal);
                }
            }
        }
    });

    ShutdownGuard {
        handle,
        thread: Some(thread),
    }
}

#[cfg(not(unix))]
pub struct ShutdownGuard;

#[cfg(not(unix))]
pub fn install_shutdown_guard(
    _supervisor: std::sync::Arc<crate::supervisor::ProcessSupervisor>,
) -> ShutdownGuard {
    ShutdownGuard
}
