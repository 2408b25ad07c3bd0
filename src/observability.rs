//! Logging setup for hosts embedding the pack builder.
//!
//! The library itself only emits through the `log` facade. Hosts that want to
//! see build progress call `enable_verbose_logging` once at startup.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use log::LevelFilter;

use crate::error::TamperError;

static LOGGER_READY: Mutex<bool> = Mutex::new(false);

/// Installs an `env_logger` at `Info` level, writing `[LEVEL] message` lines to
/// stderr or, when `log_file` is given, appending them to that file.
///
/// Only the first successful call has any effect; a call that fails (say, the
/// log file cannot be opened) can be retried. If another logger is already
/// installed this is a no-op.
pub fn enable_verbose_logging(log_file: Option<&Path>) -> Result<(), TamperError> {
    init_once(&LOGGER_READY, log_file)
}

fn init_once(ready: &Mutex<bool>, log_file: Option<&Path>) -> Result<(), TamperError> {
    let mut ready = ready.lock().unwrap_or_else(PoisonError::into_inner);
    if *ready {
        return Ok(());
    }
    init_logger(log_file)?;
    *ready = true;
    Ok(())
}

fn init_logger(log_file: Option<&Path>) -> Result<(), TamperError> {
    let mut builder = env_logger::Builder::new();

    builder.is_test(false);
    builder.filter_level(LevelFilter::Info);

    // Custom formatter: just print the level and message
    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(buf, "[{}] {}", record.level(), record.args())
    });

    if let Some(path) = log_file {
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    let _ = builder.try_init();
    Ok(())
}
