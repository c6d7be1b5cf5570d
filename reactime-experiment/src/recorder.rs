//! Session recording: timestamped data points streamed during a round, one
//! finalization record per round, and the per-session file they end up in.

use crate::aggregator::RoundSummary;
use crate::error::{ParticipantError, RecorderError};
use crate::session::{DerivedMetrics, TaskSession};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp_ms: u64,
    pub action: String,
    pub details: Value,
}

impl DataPoint {
    pub fn new(timestamp_ms: u64, action: impl Into<String>, details: Value) -> Self {
        Self {
            timestamp_ms,
            action: action.into(),
            details,
        }
    }
}

/// Everything stored for one recorded round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundRecord {
    pub game_name: String,
    pub round_summary: RoundSummary,
    pub raw_reaction_times: Vec<u64>,
    pub derived_metrics: DerivedMetrics,
    #[serde(default)]
    pub data_points: Vec<DataPoint>,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantInfo {
    pub name: String,
    pub email: Option<String>,
    pub age: Option<u32>,
    pub sex: Option<String>,
    /// Self-reported sleepiness, 1 (alert) to 9 (very sleepy).
    pub sleepiness: Option<u8>,
    pub feeling: Option<String>,
    pub mood: Option<String>,
    pub consent: bool,
}

impl ParticipantInfo {
    pub const MIN_AGE: u32 = 18;

    pub fn validate(&self) -> Result<(), ParticipantError> {
        if self.name.trim().is_empty() {
            return Err(ParticipantError::MissingName);
        }
        if let Some(age) = self.age.filter(|&a| a < Self::MIN_AGE) {
            return Err(ParticipantError::Underage(age));
        }
        if !self.consent {
            return Err(ParticipantError::NoConsent);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFile {
    pub session_start: String,
    pub session_end: Option<String>,
    pub participant: Option<ParticipantInfo>,
    pub games: BTreeMap<String, RoundRecord>,
    pub tasks: Vec<TaskSession>,
}

impl SessionFile {
    pub fn new(participant: Option<ParticipantInfo>) -> Self {
        Self {
            session_start: timestamp_rfc3339(),
            session_end: None,
            participant,
            games: BTreeMap::new(),
            tasks: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, RecorderError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

pub fn timestamp_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Receives the data stream of a running battery. Recording never fails the
/// experiment; persistence errors surface only when the session is saved.
pub trait SessionRecorder {
    fn record(&mut self, game_name: &str, point: DataPoint);

    /// Attaches buffered data points for `record.game_name` and stores the round.
    fn finish_round(&mut self, record: RoundRecord);

    /// Drops whatever was buffered for a round that will never finish.
    fn discard_round(&mut self, game_name: &str);

    fn finish_task(&mut self, session: TaskSession);
}

#[derive(Debug, Clone)]
pub struct MemoryRecorder {
    pending: BTreeMap<String, Vec<DataPoint>>,
    file: SessionFile,
}

impl Default for MemoryRecorder {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MemoryRecorder {
    pub fn new(participant: Option<ParticipantInfo>) -> Self {
        Self {
            pending: BTreeMap::new(),
            file: SessionFile::new(participant),
        }
    }

    pub fn session(&self) -> &SessionFile {
        &self.file
    }

    /// Data points of a round that has not been finished yet.
    pub fn pending(&self, game_name: &str) -> &[DataPoint] {
        self.pending.get(game_name).map_or(&[], Vec::as_slice)
    }

    pub fn into_session(mut self) -> SessionFile {
        self.file.session_end.get_or_insert_with(timestamp_rfc3339);
        self.file
    }
}

impl SessionRecorder for MemoryRecorder {
    fn record(&mut self, game_name: &str, point: DataPoint) {
        self.pending
            .entry(game_name.to_string())
            .or_default()
            .push(point);
    }

    fn finish_round(&mut self, mut record: RoundRecord) {
        if let Some(points) = self.pending.remove(&record.game_name) {
            record.data_points.extend(points);
        }
        tracing::debug!(
            game = %record.game_name,
            points = record.data_points.len(),
            "round recorded"
        );
        self.file.games.insert(record.game_name.clone(), record);
    }

    fn discard_round(&mut self, game_name: &str) {
        if let Some(points) = self.pending.remove(game_name) {
            tracing::debug!(game = %game_name, points = points.len(), "round discarded");
        }
    }

    fn finish_task(&mut self, session: TaskSession) {
        self.file.tasks.push(session);
    }
}

/// In-memory recorder that writes the session to a JSON file on [`save`](Self::save).
#[derive(Debug, Clone)]
pub struct JsonSessionRecorder {
    path: PathBuf,
    inner: MemoryRecorder,
}

impl JsonSessionRecorder {
    pub fn new(path: impl Into<PathBuf>, participant: Option<ParticipantInfo>) -> Self {
        Self {
            path: path.into(),
            inner: MemoryRecorder::new(participant),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session(&self) -> &SessionFile {
        self.inner.session()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Stamps the session end and writes the file atomically (temp file + rename).
    pub fn save(&mut self) -> Result<(), RecorderError> {
        self.inner.file.session_end = Some(timestamp_rfc3339());
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.temp_path();
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &self.inner.file)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        tracing::info!(
            path = %self.path.display(),
            games = self.inner.file.games.len(),
            "session saved"
        );
        Ok(())
    }
}

impl SessionRecorder for JsonSessionRecorder {
    fn record(&mut self, game_name: &str, point: DataPoint) {
        self.inner.record(game_name, point);
    }

    fn finish_round(&mut self, record: RoundRecord) {
        self.inner.finish_round(record);
    }

    fn discard_round(&mut self, game_name: &str) {
        self.inner.discard_round(game_name);
    }

    fn finish_task(&mut self, session: TaskSession) {
        self.inner.finish_task(session);
    }
}
