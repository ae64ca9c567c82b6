use std::{fs::{self, File, OpenOptions}, io::{BufWriter, Write}, path::{Path, PathBuf}};

use chrono::{DateTime, Local};
use log::Level;
use parking_lot::Mutex;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub message: String,
}

enum Sink {
    File { path: PathBuf, writer: BufWriter<File> },
    Memory(Vec<AuditRecord>),
    Disabled,
}

/// Append-only diagnostic trail for one analysis session.
///
/// Constructed by whoever drives the analysis and handed to the pipeline.
/// Every event is also forwarded to the `log` facade.
pub struct AuditLog {
    sink: Mutex<Sink>,
}

impl AuditLog {
    /// Opens (or appends to) `log_<YYYY-MM-DD>.txt` inside `dir`.
    pub fn open_in<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let path = dir.join(Local::now().format("log_%Y-%m-%d.txt").to_string());
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            sink: Mutex::new(Sink::File {
                path,
                writer: BufWriter::new(file),
            }),
        })
    }

    pub fn in_memory() -> Self {
        Self { sink: Mutex::new(Sink::Memory(Vec::new())) }
    }

    pub fn disabled() -> Self {
        Self { sink: Mutex::new(Sink::Disabled) }
    }

    pub fn path(&self) -> Option<PathBuf> {
        match &*self.sink.lock() {
            Sink::File { path, .. } => Some(path.clone()),
            _ => None,
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.record(Level::Debug, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.record(Level::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.record(Level::Warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.record(Level::Error, message.as_ref());
    }

    pub fn record(&self, level: Level, message: &str) {
        log::log!(level, "{}", message);

        let timestamp = Local::now();
        let mut sink = self.sink.lock();
        match &mut *sink {
            Sink::File { path, writer } => {
                let written = writeln!(
                    writer,
                    "{} - {} - {}",
                    timestamp.format("%Y-%m-%d %H:%M:%S,%3f"),
                    level,
                    message
                )
                .and_then(|_| writer.flush());

                if let Err(e) = written {
                    log::warn!("Could not append to audit log {}: {}", path.display(), e);
                }
            }
            Sink::Memory(records) => records.push(AuditRecord {
                timestamp,
                level,
                message: message.to_string(),
            }),
            Sink::Disabled => {}
        }
    }

    /// Records captured by an in-memory log; empty for other sinks.
    pub fn records(&self) -> Vec<AuditRecord> {
        match &*self.sink.lock() {
            Sink::Memory(records) => records.clone(),
            _ => Vec::new(),
        }
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &*self.sink.lock() {
            Sink::File { .. } => "file",
            Sink::Memory(_) => "memory",
            Sink::Disabled => "disabled",
        };
        f.debug_struct("AuditLog").field("sink", &kind).finish()
    }
}
