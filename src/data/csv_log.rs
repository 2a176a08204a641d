//! Append-only CSV log of received ticks

use crate::feed::{FeedError, Tick};
use csv::{Writer, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Column header written when the log file is created
pub const TICK_LOG_HEADER: [&str; 11] = [
    "time",
    "system_time",
    "price",
    "open_24h",
    "volume_24h",
    "low_24h",
    "high_24h",
    "volume_30d",
    "best_bid",
    "best_ask",
    "last_size",
];

/// Ticks between file handle refreshes
const REOPEN_EVERY: u64 = 100;

/// Writes one CSV line per tick, reopening the file periodically so that
/// buffered lines reach disk without keeping one handle open forever
pub struct TickLogger {
    path: PathBuf,
    writer: Writer<File>,
    written: u64,
}

impl TickLogger {
    /// Open `path` for appending, writing the header if the file is new
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let path = path.as_ref().to_path_buf();

        let writer = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                let mut writer = Self::writer(file);
                writer.write_record(TICK_LOG_HEADER).map_err(log_error)?;
                writer.flush().map_err(log_error)?;
                writer
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Self::writer(Self::append(&path)?),
            Err(e) => return Err(log_error(e)),
        };

        tracing::debug!(path = %path.display(), "Opened tick log");

        Ok(Self {
            path,
            writer,
            written: 0,
        })
    }

    /// Append a tick
    pub fn log(&mut self, tick: &Tick) -> Result<(), FeedError> {
        if self.written > 0 && self.written % REOPEN_EVERY == 0 {
            self.reopen()?;
        }

        let system_time = tick.timestamp.timestamp_micros() as f64 / 1_000_000.0;
        self.writer
            .write_record([
                tick.exchange_time.clone(),
                system_time.to_string(),
                tick.price.to_string(),
                tick.open_24h.to_string(),
                tick.volume_24h.to_string(),
                tick.low_24h.to_string(),
                tick.high_24h.to_string(),
                tick.volume_30d.to_string(),
                tick.best_bid.to_string(),
                tick.best_ask.to_string(),
                tick.last_size.to_string(),
            ])
            .map_err(log_error)?;

        self.written += 1;
        Ok(())
    }

    /// Flush buffered lines
    pub fn flush(&mut self) -> Result<(), FeedError> {
        self.writer.flush().map_err(log_error)
    }

    /// Number of ticks written through this logger
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reopen(&mut self) -> Result<(), FeedError> {
        self.writer.flush().map_err(log_error)?;
        self.writer = Self::writer(Self::append(&self.path)?);
        Ok(())
    }

    fn append(path: &Path) -> Result<File, FeedError> {
        OpenOptions::new().append(true).open(path).map_err(log_error)
    }

    fn writer(file: File) -> Writer<File> {
        WriterBuilder::new().has_headers(false).from_writer(file)
    }
}

impl Drop for TickLogger {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!(error = %e, path = %self.path.display(), "Failed to flush tick log");
        }
    }
}

fn log_error(e: impl std::fmt::Display) -> FeedError {
    FeedError::Log(e.to_string())
}
