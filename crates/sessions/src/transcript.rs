//! Append-only JSONL transcripts.
//!
//! Each session gets a `<sessionId>.jsonl` file under the transcript
//! directory. Every committed turn is appended as a single JSON line.

use std::path::{Path, PathBuf};

use ka_domain::error::{Error, Result};
use ka_domain::trace::TraceEvent;
use serde::{Deserialize, Serialize};

use crate::history::Turn;

/// A single transcript line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub timestamp: String,
    pub role: String,
    pub content: String,
}

impl From<&Turn> for TranscriptLine {
    fn from(turn: &Turn) -> Self {
        Self {
            timestamp: turn
                .timestamp
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            role: turn.role.as_str().to_owned(),
            content: turn.content.clone(),
        }
    }
}

/// Writes append-only JSONL transcript files.
pub struct TranscriptWriter {
    base_dir: PathBuf,
}

impl TranscriptWriter {
    /// Create a writer rooted at `base_dir`, creating the directory if needed.
    pub fn new(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir).map_err(Error::Io)?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.jsonl"))
    }

    /// Append turns to a session's transcript.
    ///
    /// Uses `spawn_blocking` to avoid blocking the tokio runtime during file I/O.
    pub async fn append_async(&self, session_id: &str, turns: &[Turn]) -> Result<()> {
        if turns.is_empty() {
            return Ok(());
        }

        let buf = serialize_turns(turns)?;
        let path = self.path_for(session_id);
        let line_count = turns.len();

        tokio::task::spawn_blocking(move || write_append(&path, &buf))
            .await
            .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;

        TraceEvent::TranscriptAppend {
            session_id: session_id.to_owned(),
            lines: line_count,
        }
        .emit();
        Ok(())
    }
}

fn serialize_turns(turns: &[Turn]) -> Result<String> {
    let mut buf = String::new();
    for turn in turns {
        let json = serde_json::to_string(&TranscriptLine::from(turn))?;
        buf.push_str(&json);
        buf.push('\n');
    }
    Ok(buf)
}

fn write_append(path: &Path, buf: &str) -> Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(Error::Io)?;
    file.write_all(buf.as_bytes()).map_err(Error::Io)?;
    Ok(())
}
