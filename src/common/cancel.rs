use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(unix)]
use std::sync::OnceLock;

/// Error returned by every poll point once the token has been cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Cooperative cancellation token.
///
/// Clones share one flag. The flag moves from active to cancelled exactly
/// once and never back; long-running operations observe it via [`check`].
///
/// [`check`]: Cancellation::check
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Fail with [`Cancelled`] if cancellation was requested.
    /// A single atomic load: safe to call once per line or per thousand bytes.
    #[inline]
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Token cancelled by the signal handler. Set at most once per process.
#[cfg(unix)]
static SIGNAL_TOKEN: OnceLock<Cancellation> = OnceLock::new();

#[cfg(unix)]
extern "C" fn on_signal(_sig: libc::c_int) {
    // Only an atomic load and an atomic store: async-signal-safe.
    if let Some(token) = SIGNAL_TOKEN.get() {
        token.cancel();
    }
}

/// Route SIGINT, SIGTERM and SIGHUP to `token`.
///
/// Handlers are installed without SA_RESTART, so a read() blocked on a pipe
/// fails with EINTR and the reader gets a chance to poll the token instead
/// of going straight back to sleep.
#[cfg(unix)]
pub fn cancel_on_signals(token: &Cancellation) -> std::io::Result<()> {
    if SIGNAL_TOKEN.set(token.clone()).is_err() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "signal handlers already installed",
        ));
    }

    for sig in [libc::SIGINT, libc::SIGTERM, libc::SIGHUP] {
        // SAFETY: the sigaction struct is fully initialized (zeroed, then the
        // handler and an empty mask set) before being handed to the kernel.
        let ret = unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            action.sa_flags = 0;
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(sig, &action, std::ptr::null_mut())
        };
        if ret != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn cancel_on_signals(_token: &Cancellation) -> std::io::Result<()> {
    Ok(())
}
