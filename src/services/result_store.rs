use crate::errors::Result;
use crate::models::screening::{QualifiedCandidate, ScreeningOutcome, ScreeningRecord, ScreeningSession};
use crate::util::arrow_utils;
use chrono::{Duration, Utc};
use log::info;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const RESULTS_FILE: &str = "results.arrow";
const SESSIONS_FILE: &str = "sessions.arrow";

/// Screening results and run sessions, kept as Arrow IPC files under one directory.
pub struct ResultStore {
    data_dir: PathBuf,
}

impl ResultStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn results_path(&self) -> PathBuf {
        self.data_dir.join(RESULTS_FILE)
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.data_dir.join(SESSIONS_FILE)
    }

    /// Create the directory and any missing file as an empty, schema-only table.
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        if !self.results_path().exists() {
            arrow_utils::write_empty(arrow_utils::results_schema(), &self.results_path())?;
        }
        if !self.sessions_path().exists() {
            arrow_utils::write_empty(arrow_utils::sessions_schema(), &self.sessions_path())?;
        }
        Ok(())
    }

    /// Append a run's candidates and its session record.
    pub fn record_run(&self, outcome: &ScreeningOutcome) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;

        let mut records = self.results()?;
        records.extend(outcome.candidates.iter().map(|candidate| ScreeningRecord {
            screened_at: outcome.session.timestamp,
            candidate: candidate.clone(),
        }));
        arrow_utils::save_results(&records, &self.results_path())?;

        let mut sessions = self.sessions()?;
        sessions.push(outcome.session.clone());
        arrow_utils::save_sessions(&sessions, &self.sessions_path())?;

        info!(
            "Recorded run with {} candidates ({} sessions stored)",
            outcome.candidates.len(),
            sessions.len()
        );
        Ok(())
    }

    pub fn results(&self) -> Result<Vec<ScreeningRecord>> {
        let path = self.results_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        arrow_utils::read_results(&path)
    }

    /// Latest row per symbol screened within `max_age`, highest score first.
    pub fn fresh_results(&self, max_age: Duration) -> Result<Vec<QualifiedCandidate>> {
        let cutoff = Utc::now() - max_age;
        let mut records = self.results()?;
        records.sort_by(|a, b| b.screened_at.cmp(&a.screened_at));

        let mut seen = HashSet::new();
        let mut fresh: Vec<QualifiedCandidate> = records
            .into_iter()
            .filter(|r| seen.insert(r.candidate.symbol.clone()))
            .filter(|r| r.screened_at >= cutoff)
            .map(|r| r.candidate)
            .collect();

        fresh.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(fresh)
    }

    /// Oldest first.
    pub fn sessions(&self) -> Result<Vec<ScreeningSession>> {
        let path = self.sessions_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut sessions = arrow_utils::read_sessions(&path)?;
        sessions.sort_by_key(|s| s.timestamp);
        Ok(sessions)
    }

    pub fn latest_session(&self) -> Result<Option<ScreeningSession>> {
        Ok(self.sessions()?.pop())
    }
}
