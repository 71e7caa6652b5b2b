//! Logging to the systemd user journal (`journalctl --user -t schedulife -f`).
//!
//! Crate targets log at info, or debug while the debug toggle is on; everything
//! else is held to warn.

use log::{LevelFilter, Log, Metadata, Record};
use systemd_journal_logger::JournalLog;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot connect to the journal: {0}")]
    Journal(#[from] std::io::Error),
    #[error("a logger is already installed")]
    AlreadyInstalled(#[from] log::SetLoggerError),
}

/// Highest level let through for a record target.
pub fn max_level_for(target: &str, debug: bool) -> LevelFilter {
    if target.starts_with(env!("CARGO_CRATE_NAME")) {
        if debug { LevelFilter::Debug } else { LevelFilter::Info }
    } else {
        LevelFilter::Warn
    }
}

struct FilteredJournal {
    inner: JournalLog,
}

impl Log for FilteredJournal {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= max_level_for(metadata.target(), crate::debug_logging())
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.inner.log(record);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the journal logger under `identifier`. Fails if another logger is installed.
pub fn init(identifier: &str, debug: bool) -> Result<(), LoggingError> {
    let journal = JournalLog::new()?.with_syslog_identifier(identifier.to_string());
    crate::set_debug_logging(debug);
    log::set_boxed_logger(Box::new(FilteredJournal { inner: journal }))?;
    // Global max must be Debug so crate debug logs can pass through when toggled
    log::set_max_level(LevelFilter::Debug);
    Ok(())
}
