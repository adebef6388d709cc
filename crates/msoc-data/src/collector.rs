//! Batched experience collection to JSON session files

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use msoc_core::{ActionType, State};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{DataError, Result};
use crate::record::ExperienceRecord;

pub const DEFAULT_MAX_PER_FILE: usize = 10_000;
const PROGRESS_LOG_EVERY: usize = 1_000;
const IMBALANCE_WARN_RATIO: f64 = 5.0;

fn session_name() -> String {
    format!("session_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    /// Records already written to session files
    pub total_saved: usize,
    /// Records waiting in the current batch
    pub pending: usize,
    pub session_records: usize,
    pub average_reward: f64,
    pub reward_range: (f32, f32),
    pub action_distribution: BTreeMap<i32, f64>,
    /// Most over least frequent action share; 0 with no data
    pub imbalance_ratio: f64,
}

#[derive(Serialize)]
struct BatchMetadata<'a> {
    total_experiences: usize,
    session_file: &'a str,
    batch_index: usize,
    timestamp: i64,
}

#[derive(Serialize)]
struct BatchFile<'a> {
    metadata: BatchMetadata<'a>,
    experiences: &'a [ExperienceRecord],
}

#[derive(Serialize)]
struct ExportMetadata {
    total_experiences: usize,
    export_timestamp: i64,
    action_distribution: BTreeMap<i32, f64>,
    average_reward: f64,
}

#[derive(Serialize)]
struct ExportFile<'a> {
    metadata: ExportMetadata,
    data: &'a [ExperienceRecord],
}

pub struct DataCollector {
    output_dir: PathBuf,
    records: Vec<ExperienceRecord>,
    session: String,
    batch_index: usize,
    max_per_file: usize,
    collecting: bool,
    total_saved: usize,
    session_records: usize,
    action_counts: BTreeMap<i32, usize>,
}

impl DataCollector {
    /// Create `dir/sessions` and `dir/exports` and an idle collector
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(output_dir.join("sessions"))?;
        fs::create_dir_all(output_dir.join("exports"))?;
        debug!(dir = %output_dir.display(), "Created output directories");

        Ok(Self {
            output_dir,
            records: Vec::new(),
            session: session_name(),
            batch_index: 0,
            max_per_file: DEFAULT_MAX_PER_FILE,
            collecting: false,
            total_saved: 0,
            session_records: 0,
            action_counts: BTreeMap::new(),
        })
    }

    pub fn with_max_per_file(mut self, max: usize) -> Self {
        self.max_per_file = max.max(1);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    pub fn total_experiences(&self) -> usize {
        self.total_saved
    }

    pub fn current_batch(&self) -> &[ExperienceRecord] {
        &self.records
    }

    pub fn start_collection(&mut self) {
        self.collecting = true;
        self.session_records = 0;
        self.session = session_name();
        info!(session = %self.session, "Started data collection session");
    }

    /// Flush the pending batch and stop accepting records
    pub fn stop_collection(&mut self) -> Result<()> {
        if self.collecting {
            self.save_batch()?;
            self.collecting = false;
            info!(
                session = %self.session,
                records = self.session_records,
                "Stopped data collection"
            );
        }
        Ok(())
    }

    /// Record one transition; ignored unless collecting
    pub fn record(
        &mut self,
        state: State,
        action: ActionType,
        reward: f32,
        next_state: State,
        done: bool,
        npc_name: &str,
    ) -> Result<()> {
        self.push(ExperienceRecord::new(
            state, action, reward, next_state, done, npc_name,
        ))
    }

    pub fn push(&mut self, record: ExperienceRecord) -> Result<()> {
        if !self.collecting {
            return Ok(());
        }
        *self.action_counts.entry(record.action).or_insert(0) += 1;
        self.records.push(record);
        self.session_records += 1;

        if self.records.len() >= self.max_per_file {
            self.save_batch()?;
        }
        if self.session_records % PROGRESS_LOG_EVERY == 0 {
            info!(
                records = self.session_records,
                "Collected experiences this session"
            );
        }
        Ok(())
    }

    /// Write the pending batch to `sessions/<session>_batch_<i>.json`
    pub fn save_batch(&mut self) -> Result<Option<PathBuf>> {
        if self.records.is_empty() {
            return Ok(None);
        }
        let path = self.output_dir.join("sessions").join(format!(
            "{}_batch_{}.json",
            self.session, self.batch_index
        ));
        let file = BatchFile {
            metadata: BatchMetadata {
                total_experiences: self.records.len(),
                session_file: &self.session,
                batch_index: self.batch_index,
                timestamp: chrono::Utc::now().timestamp(),
            },
            experiences: &self.records,
        };
        fs::write(&path, serde_json::to_string_pretty(&file)?)?;
        info!(
            records = self.records.len(),
            path = %path.display(),
            "Saved experience batch"
        );

        self.total_saved += self.records.len();
        self.records.clear();
        self.batch_index += 1;
        Ok(Some(path))
    }

    /// Write the pending batch to `exports/<name>` with summary metadata.
    /// `name` may not contain directory components.
    pub fn export_json(&self, name: &str) -> Result<PathBuf> {
        let name = if name.is_empty() {
            "exported_data.json"
        } else {
            name
        };
        if Path::new(name).file_name() != Some(std::ffi::OsStr::new(name)) {
            return Err(DataError::InvalidFormat(format!(
                "export name must be a plain file name, got {name:?}"
            )));
        }
        let path = self.output_dir.join("exports").join(name);
        let file = ExportFile {
            metadata: ExportMetadata {
                total_experiences: self.records.len(),
                export_timestamp: chrono::Utc::now().timestamp(),
                action_distribution: self.action_distribution(),
                average_reward: self.average_reward(),
            },
            data: &self.records,
        };
        fs::write(&path, serde_json::to_string_pretty(&file)?)?;
        info!(
            records = self.records.len(),
            path = %path.display(),
            "Exported experiences"
        );
        Ok(path)
    }

    pub fn clear_current(&mut self) {
        self.records.clear();
    }

    /// Share of each action code across everything recorded
    pub fn action_distribution(&self) -> BTreeMap<i32, f64> {
        let total: usize = self.action_counts.values().sum();
        if total == 0 {
            return BTreeMap::new();
        }
        self.action_counts
            .iter()
            .map(|(action, count)| (*action, *count as f64 / total as f64))
            .collect()
    }

    /// Mean reward of the pending batch
    pub fn average_reward(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.records.iter().map(|r| f64::from(r.reward)).sum::<f64>() / self.records.len() as f64
    }

    /// (min, max) reward of the pending batch
    pub fn reward_range(&self) -> (f32, f32) {
        let mut rewards = self.records.iter().map(|r| r.reward);
        let Some(first) = rewards.next() else {
            return (0.0, 0.0);
        };
        rewards.fold((first, first), |(lo, hi), r| (lo.min(r), hi.max(r)))
    }

    pub fn statistics(&self) -> CollectionStats {
        let distribution = self.action_distribution();
        let max = distribution.values().copied().fold(0.0, f64::max);
        let min = distribution.values().copied().fold(f64::INFINITY, f64::min);
        let imbalance_ratio = if distribution.is_empty() { 0.0 } else { max / min };
        if imbalance_ratio > IMBALANCE_WARN_RATIO {
            warn!(imbalance_ratio, "High action imbalance detected");
        }

        CollectionStats {
            total_saved: self.total_saved,
            pending: self.records.len(),
            session_records: self.session_records,
            average_reward: self.average_reward(),
            reward_range: self.reward_range(),
            action_distribution: distribution,
            imbalance_ratio,
        }
    }

    pub fn save_statistics(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(&self.statistics())?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_collector(dir: &Path) -> DataCollector {
        let mut collector = DataCollector::new(dir).unwrap().with_max_per_file(3);
        collector.start_collection();
        collector
    }

    fn record(collector: &mut DataCollector, action: ActionType, reward: f32) {
        collector
            .record(State::default(), action, reward, State::default(), false, "NPC_1")
            .unwrap();
    }

    #[test]
    fn test_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let collector = DataCollector::new(dir.path().join("out")).unwrap();
        assert!(dir.path().join("out/sessions").is_dir());
        assert!(dir.path().join("out/exports").is_dir());
        assert!(collector.session().starts_with("session_"));
        assert!(!collector.is_collecting());
    }

    #[test]
    fn test_ignored_when_not_collecting() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = DataCollector::new(dir.path()).unwrap();
        record(&mut collector, ActionType::Move, 1.0);
        assert!(collector.current_batch().is_empty());
        assert!(collector.action_distribution().is_empty());
    }

    #[test]
    fn test_auto_save_at_batch_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = create_test_collector(dir.path());
        for _ in 0..4 {
            record(&mut collector, ActionType::ChopTree, 10.0);
        }
        assert_eq!(collector.total_experiences(), 3);
        assert_eq!(collector.current_batch().len(), 1);

        let batch = dir
            .path()
            .join("sessions")
            .join(format!("{}_batch_0.json", collector.session()));
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(batch).unwrap()).unwrap();
        assert_eq!(value["metadata"]["total_experiences"], 3);
        assert_eq!(value["metadata"]["batch_index"], 0);
        assert_eq!(value["experiences"].as_array().unwrap().len(), 3);
        assert_eq!(value["experiences"][0]["action"], 2);

        collector.stop_collection().unwrap();
        assert_eq!(collector.total_experiences(), 4);
        assert!(collector.current_batch().is_empty());
        assert!(!collector.is_collecting());
    }

    #[test]
    fn test_export_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = create_test_collector(dir.path());
        record(&mut collector, ActionType::Move, 2.0);
        record(&mut collector, ActionType::Rest, 4.0);

        let path = collector.export_json("").unwrap();
        assert!(path.ends_with("exports/exported_data.json"));
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["data"].as_array().unwrap().len(), 2);
        assert_eq!(value["metadata"]["average_reward"], 3.0);
        assert_eq!(value["metadata"]["action_distribution"]["1"], 0.5);
    }

    #[test]
    fn test_export_name_cannot_leave_exports_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = create_test_collector(&dir.path().join("out"));
        record(&mut collector, ActionType::Move, 1.0);

        assert!(collector.export_json("../escaped.json").is_err());
        assert!(collector.export_json("nested/x.json").is_err());
        assert!(collector.export_json("..").is_err());
        assert!(!dir.path().join("escaped.json").exists());
        assert!(collector.export_json("ok.json").unwrap().ends_with("exports/ok.json"));
    }

    #[test]
    fn test_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = DataCollector::new(dir.path()).unwrap();
        collector.start_collection();
        for _ in 0..6 {
            record(&mut collector, ActionType::Move, -1.0);
        }
        record(&mut collector, ActionType::GatherBush, 10.0);

        let stats = collector.statistics();
        assert_eq!(stats.pending, 7);
        assert_eq!(stats.reward_range, (-1.0, 10.0));
        assert!((stats.imbalance_ratio - 6.0).abs() < 1e-9);
        assert!((stats.action_distribution[&1] - 6.0 / 7.0).abs() < 1e-12);

        let path = dir.path().join("stats.json");
        collector.save_statistics(&path).unwrap();
        assert!(path.exists());
    }
}
