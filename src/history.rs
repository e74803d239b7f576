//! Conversation log.
//!
//! Every completed exchange is appended as one JSON object per line to a monthly file,
//! `llm_cli_YYYYMM.log`, inside the logs directory:
//!
//! ```text
//! {"timestamp":"2025-03-14 09:26:53,589","level":"INFO","query":"...","response":"..."}
//! ```
//!
//! `llm history` reads the current month's file back and shows the most recent entries.

use chrono::{DateTime, Local};
use crossterm::style::Stylize;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Entries shown by `llm history` when `-n` is not given.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";
const PREVIEW_CHARS: usize = 60;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub level: String,
    pub query: String,
    pub response: String,
}

/// Monthly JSON-lines log rooted at a directory.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    dir: PathBuf,
}

impl HistoryLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Log file holding the entries of `now`'s month.
    pub fn file_for(&self, now: DateTime<Local>) -> PathBuf {
        self.dir
            .join(format!("llm_cli_{}.log", now.format("%Y%m")))
    }

    pub fn append(&self, query: &str, response: &str) -> io::Result<()> {
        self.append_at(Local::now(), query, response)
    }

    pub fn append_at(&self, now: DateTime<Local>, query: &str, response: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let entry = HistoryEntry {
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            level: "INFO".to_string(),
            query: query.to_string(),
            response: response.to_string(),
        };
        let line = serde_json::to_string(&entry)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(now))?;
        writeln!(file, "{line}")
    }

    /// The last `limit` entries of the current month, oldest first.
    ///
    /// Returns `None` when this month has no log file yet.
    pub fn last_entries(&self, limit: usize) -> io::Result<Option<Vec<HistoryEntry>>> {
        self.last_entries_at(Local::now(), limit)
    }

    pub fn last_entries_at(
        &self,
        now: DateTime<Local>,
        limit: usize,
    ) -> io::Result<Option<Vec<HistoryEntry>>> {
        let path = self.file_for(now);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => debug!("Skipping malformed line {} of {}: {e}", number + 1, path.display()),
            }
        }

        let skip = entries.len().saturating_sub(limit);
        Ok(Some(entries.split_off(skip)))
    }
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{cut}...")
    }
}

/// Print `entries` as a table.
pub fn display_history<W: Write>(out: &mut W, entries: &[HistoryEntry]) -> io::Result<()> {
    writeln!(
        out,
        "{:<23}  {:<5}  {:<width$}  {}",
        "Timestamp".magenta().bold(),
        "Level".green().bold(),
        "Query".cyan().bold(),
        "Response".yellow().bold(),
        width = PREVIEW_CHARS,
    )?;
    for entry in entries {
        writeln!(
            out,
            "{:<23}  {:<5}  {:<width$}  {}",
            entry.timestamp,
            entry.level,
            preview(&entry.query),
            preview(&entry.response),
            width = PREVIEW_CHARS,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn march() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn file_name_carries_year_and_month() {
        let log = HistoryLog::new("/logs");
        assert_eq!(
            log.file_for(march()),
            PathBuf::from("/logs/llm_cli_202503.log")
        );
    }

    #[test]
    fn appended_entries_are_json_lines() {
        let dir = tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("logs"));

        log.append_at(march(), "what is 2+2?", "4\nobviously").unwrap();

        let raw = fs::read_to_string(log.file_for(march())).unwrap();
        assert_eq!(raw.lines().count(), 1);
        let entry: HistoryEntry = serde_json::from_str(raw.trim()).unwrap();
        assert_eq!(entry.timestamp, "2025-03-14 09:26:53,000");
        assert_eq!(entry.level, "INFO");
        assert_eq!(entry.response, "4\nobviously");
    }

    #[test]
    fn last_entries_keeps_the_tail_and_skips_garbage() {
        let dir = tempdir().unwrap();
        let log = HistoryLog::new(dir.path());
        for i in 0..5 {
            log.append_at(march(), &format!("q{i}"), "r").unwrap();
        }
        let mut file = OpenOptions::new()
            .append(true)
            .open(log.file_for(march()))
            .unwrap();
        writeln!(file, "not json at all").unwrap();

        let entries = log.last_entries_at(march(), 3).unwrap().unwrap();
        let queries: Vec<_> = entries.iter().map(|e| e.query.as_str()).collect();
        assert_eq!(queries, vec!["q2", "q3", "q4"]);

        let all = log.last_entries_at(march(), 100).unwrap().unwrap();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn missing_month_file_is_none() {
        let dir = tempdir().unwrap();
        let log = HistoryLog::new(dir.path());
        assert!(log.last_entries_at(march(), 10).unwrap().is_none());
    }

    #[test]
    fn table_flattens_and_truncates_long_text() {
        let entry = HistoryEntry {
            timestamp: "2025-03-14 09:26:53,000".into(),
            level: "INFO".into(),
            query: "line one\nline two".into(),
            response: "x".repeat(200),
        };
        let mut out = Vec::new();
        display_history(&mut out, &[entry]).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("line one line two"));
        assert!(text.contains(&format!("{}...", "x".repeat(PREVIEW_CHARS - 3))));
        assert!(!text.contains(&"x".repeat(PREVIEW_CHARS)));
    }
}
