//! The process-wide exit path for errors nothing can recover from.

use log::error;

/// Logs `err`, prints it with its context chain and exits with status 1.
pub fn fatal(err: impl Into<anyhow::Error>) -> ! {
    let err = err.into();
    error!("{err:#}");
    eprintln!("Error: {err:?}");
    std::process::exit(1);
}
