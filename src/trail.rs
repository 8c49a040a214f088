//! Session trail persistence.
//!
//! Each session owns a directory under the sessions root, keyed by an
//! epoch-ms session key. Stage checkpoints are appended to `trail.jsonl`
//! as newline-delimited JSON, so a session is auditable and resumable from
//! its latest entry. The final report lands next to it as `report.json`.

use crate::session::{SessionReport, Stage, StageSink};
use crate::state::ReviewState;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current schema version for `trail.jsonl` entries.
pub const TRAIL_SCHEMA_VERSION: u32 = 1;

/// One stage checkpoint: the full state as it stood after the stage ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailEntry {
    pub schema_version: u32,
    pub session_key: String,
    pub ts_epoch_ms: u128,
    pub stage: String,
    pub state: ReviewState,
}

/// Layout of one session's artifacts under the sessions root.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    root: PathBuf,
    session_key: String,
}

impl SessionPaths {
    pub fn new(root: PathBuf, session_key: &str) -> Self {
        SessionPaths {
            root,
            session_key: session_key.to_string(),
        }
    }

    pub fn session_dir(&self) -> PathBuf {
        self.root.join(&self.session_key)
    }

    pub fn trail_path(&self) -> PathBuf {
        self.session_dir().join("trail.jsonl")
    }

    pub fn report_path(&self) -> PathBuf {
        self.session_dir().join("report.json")
    }
}

pub fn now_epoch_ms() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before unix epoch")?
        .as_millis())
}

/// Mint a session key from the current epoch-ms timestamp.
pub fn new_session_key() -> Result<String> {
    Ok(format!("{}", now_epoch_ms()?))
}

/// Default sessions root: `<data dir>/derisk/sessions`.
pub fn default_sessions_root() -> Result<PathBuf> {
    let base = dirs::data_dir().context("resolve user data directory")?;
    Ok(base.join("derisk").join("sessions"))
}

/// Append a trail entry as JSONL.
pub fn append_trail(paths: &SessionPaths, entry: &TrailEntry) -> Result<()> {
    let path = paths.trail_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("create session dir")?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    let line = serde_json::to_string(entry).context("serialize trail entry")?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Load every entry of a session's trail, in append order.
pub fn load_trail(paths: &SessionPaths) -> Result<Vec<TrailEntry>> {
    let path = paths.trail_path();
    let text =
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let mut entries = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: TrailEntry = serde_json::from_str(line)
            .with_context(|| format!("parse trail line {} in {}", idx + 1, path.display()))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Write the final session report snapshot.
pub fn write_report(paths: &SessionPaths, report: &SessionReport) -> Result<()> {
    let path = paths.report_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("create session dir")?;
    }
    let text = serde_json::to_string_pretty(report).context("serialize session report")?;
    fs::write(&path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// List session keys under a root, newest first.
pub fn list_sessions(root: &Path) -> Result<Vec<String>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut keys = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("read {}", root.display()))? {
        let entry = entry.context("read sessions dir entry")?;
        if entry.file_type().context("stat sessions dir entry")?.is_dir() {
            keys.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    keys.sort();
    keys.reverse();
    Ok(keys)
}

/// Sink that checkpoints every stage to the session's trail file.
pub struct SessionTrail {
    paths: SessionPaths,
}

impl SessionTrail {
    pub fn new(paths: SessionPaths) -> Self {
        SessionTrail { paths }
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }
}

impl StageSink for SessionTrail {
    fn record(&mut self, stage: Stage, state: &ReviewState) -> Result<()> {
        let entry = TrailEntry {
            schema_version: TRAIL_SCHEMA_VERSION,
            session_key: self.paths.session_key.clone(),
            ts_epoch_ms: now_epoch_ms()?,
            stage: stage.as_str().to_string(),
            state: state.clone(),
        };
        append_trail(&self.paths, &entry)
    }
}
