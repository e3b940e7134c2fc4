//! Snapshot persistence seam.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::RebalanceSnapshot;

/// Receives each snapshot before the next rebalance date is processed.
/// An error stops the run.
pub trait SnapshotSink {
    fn persist(&mut self, snapshot: &RebalanceSnapshot) -> Result<()>;
}

/// Keeps snapshots in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    snapshots: Vec<RebalanceSnapshot>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> &[RebalanceSnapshot] {
        &self.snapshots
    }

    pub fn into_snapshots(self) -> Vec<RebalanceSnapshot> {
        self.snapshots
    }
}

impl SnapshotSink for MemorySink {
    fn persist(&mut self, snapshot: &RebalanceSnapshot) -> Result<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }
}

/// Append-only JSON Lines file, one snapshot per line.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    written: usize,
}

impl JsonlSink {
    /// Creates parent dirs. Existing content is kept and appended to.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create_dir_all {}", parent.display()))?;
            }
        }
        Ok(Self { path, written: 0 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines appended by this sink.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Read back every snapshot in a JSONL file. Blank lines are skipped.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<RebalanceSnapshot>> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read snapshot log {}", path.display()))?;
        raw.lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, l)| {
                serde_json::from_str(l)
                    .with_context(|| format!("parse snapshot at {}:{}", path.display(), i + 1))
            })
            .collect()
    }
}

impl SnapshotSink for JsonlSink {
    fn persist(&mut self, snapshot: &RebalanceSnapshot) -> Result<()> {
        let line = serde_json::to_string(snapshot).context("serialize snapshot")?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open snapshot log {}", self.path.display()))?;
        f.write_all(line.as_bytes())
            .and_then(|_| f.write_all(b"\n"))
            .with_context(|| format!("append snapshot log {}", self.path.display()))?;
        self.written += 1;
        Ok(())
    }
}
