//! Trace writer for JSONL file persistence.
//!
//! Each write appends one tracer's encoded stage sequence as a single line.
//! Supports two modes:
//! - **Session mode**: Writes to a single file (e.g., `session_dir/traces.jsonl`)
//! - **Daily rotation**: Writes to dated files (e.g., `traces/2026-01-11.jsonl`)

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tracer::Tracer;

/// Configuration for the trace writer.
///
/// Deserializable so host applications can embed it in their own config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Path for trace output.
    /// - Session mode: Full path to trace file
    /// - Daily rotation: Directory for dated files
    pub trace_path: PathBuf,

    /// Whether writing is enabled.
    pub enabled: bool,

    /// Session mode writes to a single file; daily rotation writes to dated files.
    pub session_mode: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::daily_rotation(".stagetrace/traces")
    }
}

impl WriterConfig {
    /// Config for a single session file.
    pub fn session(trace_file: impl Into<PathBuf>) -> Self {
        Self {
            trace_path: trace_file.into(),
            enabled: true,
            session_mode: true,
        }
    }

    /// Config for one file per day inside `trace_dir`.
    pub fn daily_rotation(trace_dir: impl Into<PathBuf>) -> Self {
        Self {
            trace_path: trace_dir.into(),
            enabled: true,
            session_mode: false,
        }
    }

    /// Config that writes nothing.
    pub fn disabled() -> Self {
        Self {
            trace_path: PathBuf::new(),
            enabled: false,
            session_mode: false,
        }
    }
}

/// Writes tracers to JSONL files.
///
/// Thread-safe via internal mutex.
pub struct TraceWriter {
    config: WriterConfig,
    current_file: Mutex<Option<CurrentFile>>,
}

struct CurrentFile {
    /// For daily rotation: the date string. For session mode: "session".
    key: String,
    writer: BufWriter<File>,
}

impl TraceWriter {
    /// Create a new trace writer with the given configuration.
    pub fn new(config: WriterConfig) -> Result<Self> {
        if config.enabled {
            if config.session_mode {
                if let Some(parent) = config.trace_path.parent() {
                    fs::create_dir_all(parent)?;
                }
            } else {
                fs::create_dir_all(&config.trace_path)?;
            }
        }

        Ok(Self {
            config,
            current_file: Mutex::new(None),
        })
    }

    /// The configuration this writer was built with.
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Append a tracer to the appropriate file.
    pub fn write(&self, tracer: &Tracer) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        // Encode before locking so a bad tracer never touches the file.
        let line = tracer.serialize()?;

        let key = if self.config.session_mode {
            "session".to_string()
        } else {
            today()
        };

        let mut guard = self
            .current_file
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let needs_new_file = match &*guard {
            None => true,
            Some(cf) => cf.key != key,
        };

        if needs_new_file {
            let path = self.file_path_for(&key);
            tracing::debug!(path = %path.display(), "opening trace file");
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            *guard = Some(CurrentFile {
                key,
                writer: BufWriter::new(file),
            });
        }

        if let Some(cf) = guard.as_mut() {
            cf.writer.write_all(&line)?;
            cf.writer.write_all(b"\n")?;
            cf.writer.flush()?;
        }

        Ok(())
    }

    fn file_path_for(&self, key: &str) -> PathBuf {
        if self.config.session_mode {
            self.config.trace_path.clone()
        } else {
            self.config.trace_path.join(format!("{}.jsonl", key))
        }
    }

    /// Get the path to the current trace file.
    pub fn current_file_path(&self) -> PathBuf {
        if self.config.session_mode {
            self.config.trace_path.clone()
        } else {
            self.file_path_for(&today())
        }
    }

    /// List trace files, oldest first.
    pub fn list_trace_files(&self) -> Result<Vec<PathBuf>> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }

        if self.config.session_mode {
            if self.config.trace_path.exists() {
                return Ok(vec![self.config.trace_path.clone()]);
            }
            return Ok(Vec::new());
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&self.config.trace_path)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
            .collect();

        files.sort();
        Ok(files)
    }

    /// Read every tracer stored in a trace file, in write order.
    pub fn read_traces(path: &Path) -> Result<Vec<Tracer>> {
        let content = fs::read_to_string(path)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Tracer::deserialize(line.as_bytes()))
            .collect()
    }
}

fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}
