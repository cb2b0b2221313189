//! Reload and shutdown requests delivered by signals.
//!
//! SIGHUP requests a configuration reload; SIGINT and SIGTERM request
//! shutdown. Both are only acted on between cycles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Error, Result};

static SIGHUP_RECEIVED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_sighup(_signum: libc::c_int) {
    SIGHUP_RECEIVED.store(true, Ordering::SeqCst);
}

#[derive(Debug, Clone, Default)]
pub struct Signals {
    shutdown: Arc<AtomicBool>,
    reload: Arc<AtomicBool>,
    hooked: bool,
}

impl Signals {
    /// Flags that are only set through the request methods.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Install process signal handlers. Call once per process.
    pub fn install() -> Result<Self> {
        let signals = Self {
            hooked: true,
            ..Self::default()
        };

        let shutdown = signals.shutdown.clone();
        ctrlc::set_handler(move || {
            if shutdown.swap(true, Ordering::SeqCst) {
                warn!("Received second signal, forcing immediate exit");
                std::process::exit(1);
            }
            info!("Received shutdown signal, finishing current cycle...");
        })
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        #[cfg(unix)]
        {
            let handler = on_sighup as extern "C" fn(libc::c_int) as libc::sighandler_t;
            // SAFETY: the handler only stores to an atomic, which is
            // async-signal-safe.
            let previous = unsafe { libc::signal(libc::SIGHUP, handler) };
            if previous == libc::SIG_ERR {
                return Err(Error::Io(std::io::Error::last_os_error()));
            }
        }

        Ok(signals)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn request_reload(&self) {
        self.reload.store(true, Ordering::SeqCst);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Returns true once per reload request.
    pub fn take_reload(&self) -> bool {
        let requested = self.reload.swap(false, Ordering::SeqCst);
        let hup = self.hooked && SIGHUP_RECEIVED.swap(false, Ordering::SeqCst);
        requested || hup
    }
}
