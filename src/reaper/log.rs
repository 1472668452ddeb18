//! # Append-only reaper log.
//!
//! One line per entry, each written and flushed on its own so the file stays readable
//! if the writer dies mid-batch:
//! ```text
//! ADD 41230
//! ADD 41231
//! REM 41230
//! ```
//!
//! Replaying the log yields the survivors: groups added and never removed.

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// One log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    /// A job's process group was started.
    Add(u32),
    /// A job's process group was settled.
    Rem(u32),
}

impl Entry {
    /// Parses one line; `None` for anything malformed.
    pub fn parse(line: &str) -> Option<Entry> {
        let (tag, pid) = line.trim().split_once(' ')?;
        let pid = pid.trim().parse().ok()?;
        match tag {
            "ADD" => Some(Entry::Add(pid)),
            "REM" => Some(Entry::Rem(pid)),
            _ => None,
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Add(pid) => write!(f, "ADD {pid}"),
            Entry::Rem(pid) => write!(f, "REM {pid}"),
        }
    }
}

/// Writer side of the log.
#[derive(Debug)]
pub struct ReaperLog {
    file: File,
    path: PathBuf,
}

impl ReaperLog {
    /// Creates a fresh log in `dir` (system temp dir when `None`).
    ///
    /// The returned [`TempPath`] deletes the file when dropped.
    pub fn create(dir: Option<&Path>) -> io::Result<(Self, TempPath)> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("jobvisor-reaper-").suffix(".log");
        let named = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let (file, temp_path) = named.into_parts();
        let log = Self {
            file: File::from_std(file),
            path: temp_path.to_path_buf(),
        };
        Ok((log, temp_path))
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry and flushes it.
    pub async fn append(&mut self, entry: Entry) -> io::Result<()> {
        let line = format!("{entry}\n");
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await
    }
}

/// Process groups added and never removed, in the order of the text.
///
/// `REM` without a matching `ADD` is ignored; malformed lines are skipped with a warning.
pub fn survivors(text: &str) -> BTreeSet<u32> {
    let mut alive = BTreeSet::new();
    for (no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match Entry::parse(line) {
            Some(Entry::Add(pid)) => {
                alive.insert(pid);
            }
            Some(Entry::Rem(pid)) => {
                alive.remove(&pid);
            }
            None => tracing::warn!(line = no + 1, content = line, "skipping malformed reaper log line"),
        }
    }
    alive
}

/// Reads the log at `path` and returns its survivors.
pub fn replay(path: &Path) -> io::Result<BTreeSet<u32>> {
    let text = std::fs::read_to_string(path)?;
    Ok(survivors(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_parse_and_print() {
        assert_eq!(Entry::parse("ADD 12"), Some(Entry::Add(12)));
        assert_eq!(Entry::parse("REM 7\n"), Some(Entry::Rem(7)));
        assert_eq!(Entry::parse("ADD"), None);
        assert_eq!(Entry::parse("KILL 3"), None);
        assert_eq!(Entry::parse("ADD x"), None);
        assert_eq!(Entry::Add(5).to_string(), "ADD 5");
    }

    #[test]
    fn survivors_are_added_minus_removed() {
        let text = "ADD 1\nADD 2\nREM 1\nREM 9\ngarbage\n\nADD 3\nREM 3\nADD 3\n";
        let alive: Vec<u32> = survivors(text).into_iter().collect();
        assert_eq!(alive, vec![2, 3]);
    }

    #[tokio::test]
    async fn appended_entries_replay() {
        let dir = tempfile::tempdir().unwrap();
        let (mut log, temp_path) = ReaperLog::create(Some(dir.path())).unwrap();
        assert!(log.path().starts_with(dir.path()));

        log.append(Entry::Add(100)).await.unwrap();
        log.append(Entry::Add(200)).await.unwrap();
        log.append(Entry::Rem(100)).await.unwrap();

        let alive: Vec<u32> = replay(&temp_path).unwrap().into_iter().collect();
        assert_eq!(alive, vec![200]);

        let path = log.path().to_path_buf();
        drop(temp_path);
        assert!(!path.exists());
    }
}
