//! The append-only status log written by the wrapped program.
//!
//! Each record is one line: `<percentage>%\t<unix timestamp>\t<message>\n`.
//! The child is the only writer; readers ignore a trailing line that has not
//! been terminated yet.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RunnerResult;

/// One progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub percentage: u8,
    pub timestamp: i64,
    pub message: String,
}

impl StatusEntry {
    pub fn new(percentage: u8, message: impl Into<String>) -> Self {
        Self {
            percentage: percentage.min(100),
            timestamp: Utc::now().timestamp(),
            message: message.into(),
        }
    }

    /// Parse a single complete line (without its newline).
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.splitn(3, '\t');
        let percentage = parts.next()?.trim().strip_suffix('%')?.parse::<u8>().ok()?;
        let timestamp = parts.next()?.trim().parse::<i64>().ok()?;
        let message = parts.next().unwrap_or("").to_string();
        Some(Self {
            percentage: percentage.min(100),
            timestamp,
            message,
        })
    }

    pub fn to_line(&self) -> String {
        format!(
            "{}%\t{}\t{}\n",
            self.percentage,
            self.timestamp,
            self.message.replace(['\n', '\r'], " ")
        )
    }
}

/// Reader (and, for tests and tooling, writer) of a status log file.
#[derive(Debug, Clone)]
pub struct StatusLog {
    path: PathBuf,
}

impl StatusLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    pub fn append(&self, percentage: u8, message: &str) -> RunnerResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(StatusEntry::new(percentage, message).to_line().as_bytes())?;
        Ok(())
    }

    /// All complete records. A missing file yields no records.
    pub fn entries(&self) -> RunnerResult<Vec<StatusEntry>> {
        let content = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_log(&String::from_utf8_lossy(&content)))
    }

    /// The most recent complete record.
    pub fn last(&self) -> RunnerResult<Option<StatusEntry>> {
        Ok(self.entries()?.pop())
    }

    pub fn clear(&self) -> RunnerResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

fn parse_log(content: &str) -> Vec<StatusEntry> {
    let complete = match content.rfind('\n') {
        Some(pos) => &content[..pos],
        None => return Vec::new(),
    };
    complete
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let entry = StatusEntry::parse(line.trim_end_matches('\r'));
            if entry.is_none() {
                debug!("Skipping malformed status line: {}", line);
            }
            entry
        })
        .collect()
}
