//! SIGINT handling per the "first Ctrl-C asks nicely, second one doesn't"
//! convention: the first interrupt sets a cooperative cancel flag and lets
//! in-flight work wind down; a second interrupt, or the first one simply
//! not finishing quickly enough, force-exits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use pdfidx_core::constants::FORCE_EXIT_WARN_SECS;

/// Shared handle to the cancel flag a ctrlc handler flips. Cheap to clone
/// and pass into closures that need to poll it (`scan_with_cancel`,
/// `process_event`'s `check_cancel`).
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Install the process-wide SIGINT handler. Only one of these should
    /// ever be live per process; `ctrlc` itself enforces that.
    pub fn install() -> anyhow::Result<Self> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                eprintln!("\nforce exit requested, data may be corrupted");
                std::process::exit(130);
            }
            eprintln!("\ninterrupting... press Ctrl-C again to force exit");
            std::thread::spawn(|| {
                std::thread::sleep(Duration::from_secs(FORCE_EXIT_WARN_SECS));
                eprintln!("shutdown exceeded {FORCE_EXIT_WARN_SECS}s, forcing exit: data may be corrupted");
                std::process::exit(130);
            });
        })?;
        Ok(Self { cancelled })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
