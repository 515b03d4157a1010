//! Append-only log archive
//!
//! Every triage decision is appended to a JSONL file. The first line is a
//! schema header; each following line is one [`LogEntry`].
//!
//! ```text
//! {"schema":"payguard.resolution_log","version":1,"columns":[...]}
//! {"timestamp":"2025-03-14 09:26:53","subject_id":"ATM-1001",...}
//! {"timestamp":"2025-03-14 09:26:54","subject_id":"ATM-1002",...}
//! ```
//!
//! Writes take an exclusive `fs2` lock on the file and emit whole lines only,
//! so concurrent writers (even across processes) never interleave. Within a
//! process, [`ArchiveWriter`] funnels all appends through one task.
//!
//! Rows are never rewritten or deleted. A line torn by a crash mid-write is
//! terminated by the next append and skipped on read, so it never hides the
//! rest of the history.

use crate::error::{ArchiveError, ArchiveResult};
use crate::impact::round1;
use crate::record::{LogEntry, ResolutionMode, LOG_COLUMNS};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Schema identifier written in the header line
pub const SCHEMA_NAME: &str = "payguard.resolution_log";

/// Highest schema version this build can read
pub const SCHEMA_VERSION: u32 = 1;

/// First line of every archive file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveHeader {
    pub schema: String,
    pub version: u32,
    pub columns: Vec<String>,
}

impl ArchiveHeader {
    pub fn current() -> Self {
        Self {
            schema: SCHEMA_NAME.to_string(),
            version: SCHEMA_VERSION,
            columns: LOG_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Aggregate over the entire historical store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub total_logged: usize,
    pub auto_resolved: usize,
    pub auto_attempted: usize,
    pub manual_required: usize,
    /// Mean over AUTO_RESOLVED rows, one decimal
    pub avg_auto_time_sec: f64,
}

impl ArchiveSummary {
    pub fn from_entries(entries: &[LogEntry]) -> Self {
        let count = |mode: ResolutionMode| {
            entries
                .iter()
                .filter(|e| e.resolution_mode == mode)
                .count()
        };
        let auto_resolved = count(ResolutionMode::AutoResolved);
        let avg_auto_time_sec = if auto_resolved > 0 {
            let sum: f64 = entries
                .iter()
                .filter(|e| e.resolution_mode == ResolutionMode::AutoResolved)
                .map(|e| e.auto_resolution_time_sec)
                .sum();
            round1(sum / auto_resolved as f64)
        } else {
            0.0
        };

        Self {
            total_logged: entries.len(),
            auto_resolved,
            auto_attempted: count(ResolutionMode::AutoAttempted),
            manual_required: count(ResolutionMode::ManualRequired),
            avg_auto_time_sec,
        }
    }
}

// ============================================================================
// File store
// ============================================================================

/// JSONL archive at a fixed path
#[derive(Debug, Clone)]
pub struct LogArchive {
    path: PathBuf,
}

fn is_header_line(value: &serde_json::Value) -> bool {
    value.get("schema").is_some()
}

fn ends_with_newline(file: &mut std::fs::File, len: u64) -> std::io::Result<bool> {
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

impl LogArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry
    pub fn append(&self, entry: &LogEntry) -> ArchiveResult<()> {
        self.append_all(std::slice::from_ref(entry)).map(|_| ())
    }

    /// Append entries in order under a single lock. Returns the number written.
    pub fn append_all(&self, entries: &[LogEntry]) -> ArchiveResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut buf = String::new();
        for entry in entries {
            buf.push_str(&serde_json::to_string(entry)?);
            buf.push('\n');
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ArchiveError::io(&self.path, e))?;
        file.lock_exclusive()
            .map_err(|e| ArchiveError::io(&self.path, e))?;

        let result = (|| -> std::io::Result<()> {
            // Checked under the lock so only one writer ever emits the header
            let len = file.metadata()?.len();
            if len == 0 {
                let header = serde_json::to_string(&ArchiveHeader::current())
                    .map_err(std::io::Error::other)?;
                writeln!(file, "{header}")?;
            } else if !ends_with_newline(&mut file, len)? {
                warn!(path = %self.path.display(), "Terminating torn trailing line");
                file.write_all(b"\n")?;
            }
            file.write_all(buf.as_bytes())?;
            file.flush()?;
            file.sync_data()
        })();

        if let Err(e) = FileExt::unlock(&file) {
            warn!(path = %self.path.display(), "Failed to release archive lock: {e}");
        }
        result.map_err(|e| ArchiveError::io(&self.path, e))?;

        debug!(path = %self.path.display(), count = entries.len(), "Appended log entries");
        Ok(entries.len())
    }

    /// Schema header, if the archive has one
    pub fn header(&self) -> ArchiveResult<Option<ArchiveHeader>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ArchiveError::io(&self.path, e)),
        };
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| ArchiveError::io(&self.path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let value: serde_json::Value =
                serde_json::from_str(&line).map_err(|e| ArchiveError::Decode {
                    line: 1,
                    message: e.to_string(),
                })?;
            if !is_header_line(&value) {
                return Ok(None);
            }
            let header = serde_json::from_value(value).map_err(|e| ArchiveError::Decode {
                line: 1,
                message: e.to_string(),
            })?;
            return Ok(Some(header));
        }
        Ok(None)
    }

    /// All entries in insertion order. A missing or empty file is empty.
    ///
    /// Truncated lines left by an interrupted write are skipped with a
    /// warning, as is an undecodable final line. Any other bad line fails the
    /// read with its line number.
    pub fn read_all(&self) -> ArchiveResult<Vec<LogEntry>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArchiveError::io(&self.path, e)),
        };
        let lines = BufReader::new(file)
            .lines()
            .collect::<std::io::Result<Vec<String>>>()
            .map_err(|e| ArchiveError::io(&self.path, e))?;
        let last = lines.iter().rposition(|l| !l.trim().is_empty());

        let mut entries = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            let is_last = Some(idx) == last;

            let value: serde_json::Value = match serde_json::from_str(line) {
                Ok(value) => value,
                Err(e) if e.is_eof() || is_last => {
                    warn!(
                        path = %self.path.display(),
                        line = line_no,
                        error = %e,
                        "Skipping torn archive line"
                    );
                    continue;
                }
                Err(e) => {
                    return Err(ArchiveError::Decode {
                        line: line_no,
                        message: e.to_string(),
                    })
                }
            };

            if is_header_line(&value) {
                let header: ArchiveHeader =
                    serde_json::from_value(value).map_err(|e| ArchiveError::Decode {
                        line: line_no,
                        message: e.to_string(),
                    })?;
                if header.version > SCHEMA_VERSION {
                    return Err(ArchiveError::UnsupportedSchema {
                        found: header.version,
                        supported: SCHEMA_VERSION,
                    });
                }
                continue;
            }

            match serde_json::from_value::<LogEntry>(value) {
                Ok(entry) => entries.push(entry),
                Err(e) if is_last => {
                    warn!(
                        path = %self.path.display(),
                        line = line_no,
                        error = %e,
                        "Skipping undecodable final archive line"
                    );
                }
                Err(e) => {
                    return Err(ArchiveError::Decode {
                        line: line_no,
                        message: e.to_string(),
                    })
                }
            }
        }
        Ok(entries)
    }

    /// Resolution-mode counts and average auto time over the whole store
    pub fn summary(&self) -> ArchiveResult<ArchiveSummary> {
        Ok(ArchiveSummary::from_entries(&self.read_all()?))
    }
}

// ============================================================================
// Single-writer actor
// ============================================================================

/// Totals reported when the writer shuts down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterTotals {
    pub appended: usize,
    pub failed: usize,
}

enum WriterCommand {
    Append {
        entry: LogEntry,
        reply: oneshot::Sender<ArchiveResult<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<WriterTotals>,
    },
}

/// Task that owns the archive and serialises every append
pub struct ArchiveWriter;

impl ArchiveWriter {
    /// Default queue depth between producers and the writer task
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Spawn the writer on the current tokio runtime
    pub fn spawn(archive: LogArchive) -> ArchiveHandle {
        Self::spawn_with_capacity(archive, Self::DEFAULT_CAPACITY)
    }

    pub fn spawn_with_capacity(archive: LogArchive, capacity: usize) -> ArchiveHandle {
        let (tx, mut rx) = mpsc::channel::<WriterCommand>(capacity.max(1));

        tokio::spawn(async move {
            let mut totals = WriterTotals::default();
            while let Some(command) = rx.recv().await {
                match command {
                    WriterCommand::Append { entry, reply } => {
                        let archive = archive.clone();
                        let path = archive.path().to_path_buf();
                        let result = tokio::task::spawn_blocking(move || archive.append(&entry))
                            .await
                            .unwrap_or_else(|e| {
                                Err(ArchiveError::io(path, std::io::Error::other(e)))
                            });
                        match &result {
                            Ok(()) => totals.appended += 1,
                            Err(e) => {
                                totals.failed += 1;
                                warn!(error = %e, "Archive append failed");
                            }
                        }
                        let _ = reply.send(result);
                    }
                    WriterCommand::Shutdown { reply } => {
                        rx.close();
                        info!(
                            appended = totals.appended,
                            failed = totals.failed,
                            path = %archive.path().display(),
                            "Archive writer stopped"
                        );
                        let _ = reply.send(totals);
                        return;
                    }
                }
            }
        });

        ArchiveHandle { tx }
    }
}

/// Cloneable handle to a running [`ArchiveWriter`]
#[derive(Debug, Clone)]
pub struct ArchiveHandle {
    tx: mpsc::Sender<WriterCommand>,
}

impl ArchiveHandle {
    /// Queue an entry and wait until it is durably written
    pub async fn append(&self, entry: LogEntry) -> ArchiveResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WriterCommand::Append { entry, reply })
            .await
            .map_err(|_| ArchiveError::WriterClosed)?;
        rx.await.map_err(|_| ArchiveError::WriterClosed)?
    }

    /// Drain everything queued before this call, then stop the writer.
    ///
    /// Appends sent afterwards from other clones fail with
    /// [`ArchiveError::WriterClosed`].
    pub async fn shutdown(&self) -> ArchiveResult<WriterTotals> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WriterCommand::Shutdown { reply })
            .await
            .map_err(|_| ArchiveError::WriterClosed)?;
        rx.await.map_err(|_| ArchiveError::WriterClosed)
    }
}
