//! Loading recorded experiences for offline training

use std::fs;
use std::path::Path;

use msoc_core::{ActionType, STATE_SIZE};
use msoc_rl::{Experience, StandardScaler};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::{DataError, Result};
use crate::record::ExperienceRecord;

/// State object as found in files; numbers may be written as floats
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawState {
    pos_x: f32,
    pos_y: f32,
    nearby_trees: f32,
    nearby_rocks: f32,
    nearby_bushes: f32,
    energy_level: f32,
    inventory_level: f32,
}

impl RawState {
    fn features(&self) -> Vec<f32> {
        vec![
            self.pos_x,
            self.pos_y,
            self.nearby_trees,
            self.nearby_rocks,
            self.nearby_bushes,
            self.energy_level,
            self.inventory_level,
        ]
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    state: RawState,
    action: i64,
    reward: f64,
    next_state: RawState,
    #[serde(default)]
    done: bool,
}

/// Trainable index for an action code; unknown codes become 0
fn code_to_index(code: i64) -> usize {
    i32::try_from(code)
        .ok()
        .and_then(ActionType::from_code)
        .and_then(ActionType::trainable_index)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    experiences: Vec<Experience>,
}

impl Dataset {
    /// Read a session batch (`experiences`) or an export (`data`)
    pub fn load_json(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)?;
        let dataset = Self::from_value(value)?;
        info!(
            path = %path.display(),
            samples = dataset.len(),
            "Loaded dataset"
        );
        Ok(dataset)
    }

    pub fn from_value(mut value: Value) -> Result<Self> {
        let records = match value.get_mut("data") {
            Some(data) => data.take(),
            None => value
                .get_mut("experiences")
                .map(Value::take)
                .ok_or_else(|| {
                    DataError::InvalidFormat("expected a `data` or `experiences` array".into())
                })?,
        };
        let raw: Vec<RawRecord> = serde_json::from_value(records)?;

        let experiences = raw
            .into_iter()
            .map(|r| {
                Experience::new(
                    r.state.features(),
                    code_to_index(r.action),
                    r.reward,
                    r.next_state.features(),
                    r.done,
                )
            })
            .collect();
        Ok(Self { experiences })
    }

    pub fn from_records(records: &[ExperienceRecord]) -> Self {
        Self {
            experiences: records.iter().map(ExperienceRecord::to_experience).collect(),
        }
    }

    pub fn from_experiences(experiences: Vec<Experience>) -> Self {
        Self { experiences }
    }

    /// Standardise states and next states with a scaler fit on the states
    pub fn normalize(&mut self) -> Result<StandardScaler> {
        if self.experiences.is_empty() {
            return Err(DataError::Empty("nothing to normalize".into()));
        }
        let states: Vec<&[f32]> = self.experiences.iter().map(|e| e.state.as_slice()).collect();
        let scaler =
            StandardScaler::fit(&states).map_err(|e| DataError::InvalidFormat(e.to_string()))?;

        for exp in &mut self.experiences {
            exp.state = scaler
                .transform(&exp.state)
                .map_err(|e| DataError::InvalidFormat(e.to_string()))?;
            if !exp.next_state.is_empty() {
                exp.next_state = scaler
                    .transform(&exp.next_state)
                    .map_err(|e| DataError::InvalidFormat(e.to_string()))?;
            }
        }
        Ok(scaler)
    }

    pub fn len(&self) -> usize {
        self.experiences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiences.is_empty()
    }

    pub fn state_size(&self) -> usize {
        self.experiences
            .first()
            .map_or(STATE_SIZE, |e| e.state.len())
    }

    pub fn experiences(&self) -> &[Experience] {
        &self.experiences
    }

    pub fn into_experiences(self) -> Vec<Experience> {
        self.experiences
    }

    pub fn states(&self) -> Vec<&[f32]> {
        self.experiences.iter().map(|e| e.state.as_slice()).collect()
    }

    pub fn actions(&self) -> Vec<usize> {
        self.experiences.iter().map(|e| e.action).collect()
    }

    pub fn rewards(&self) -> Vec<f64> {
        self.experiences.iter().map(|e| e.reward).collect()
    }

    pub fn next_states(&self) -> Vec<&[f32]> {
        self.experiences
            .iter()
            .map(|e| e.next_state.as_slice())
            .collect()
    }

    pub fn dones(&self) -> Vec<bool> {
        self.experiences.iter().map(|e| e.done).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_json(x: f64) -> Value {
        serde_json::json!({
            "posX": x, "posY": 1, "nearbyTrees": 0, "nearbyRocks": 2,
            "nearbyBushes": 0, "energyLevel": 2, "inventoryLevel": 1
        })
    }

    fn record_json(action: i64, reward: f64, x: f64) -> Value {
        serde_json::json!({
            "state": state_json(x),
            "action": action,
            "reward": reward,
            "nextState": state_json(x + 1.0),
            "done": false,
            "npcName": "NPC_1",
            "timestamp": 0.0
        })
    }

    #[test]
    fn test_load_export_format() {
        let value = serde_json::json!({
            "metadata": {},
            "data": [record_json(2, 10.0, 3.0), record_json(11, -1.0, 4.5)]
        });
        let dataset = Dataset::from_value(value).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.actions(), vec![1, 10]);
        assert_eq!(dataset.rewards(), vec![10.0, -1.0]);
        assert_eq!(dataset.states()[1][0], 4.5);
        assert_eq!(dataset.next_states()[0][0], 4.0);
        assert_eq!(dataset.state_size(), 7);
    }

    #[test]
    fn test_load_session_format_and_unknown_codes() {
        let value = serde_json::json!({
            "experiences": [record_json(0, 0.0, 1.0), record_json(15, 0.0, 1.0), record_json(99, 0.0, 1.0)]
        });
        let dataset = Dataset::from_value(value).unwrap();
        assert_eq!(dataset.actions(), vec![0, 0, 0]);
        assert_eq!(dataset.dones(), vec![false, false, false]);
    }

    #[test]
    fn test_missing_array_rejected() {
        assert!(Dataset::from_value(serde_json::json!({"rows": []})).is_err());
        assert!(Dataset::from_value(serde_json::json!({"data": [{"action": 1}]})).is_err());
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        let value = serde_json::json!({"data": [record_json(3, 10.0, 0.0)]});
        fs::write(&path, value.to_string()).unwrap();

        let dataset = Dataset::load_json(&path).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.actions(), vec![2]);
        assert!(Dataset::load_json(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_normalize_applies_to_next_states() {
        let value = serde_json::json!({
            "data": [record_json(1, 0.0, 0.0), record_json(1, 0.0, 2.0)]
        });
        let mut dataset = Dataset::from_value(value).unwrap();
        let scaler = dataset.normalize().unwrap();

        assert_eq!(scaler.mean()[0], 1.0);
        assert_eq!(dataset.states()[0][0], -1.0);
        assert_eq!(dataset.states()[1][0], 1.0);
        // next posX = 1.0 and 3.0
        assert_eq!(dataset.next_states()[0][0], 0.0);
        assert_eq!(dataset.next_states()[1][0], 2.0);
        // constant columns become zero
        assert_eq!(dataset.states()[0][1], 0.0);

        assert!(Dataset::default().normalize().is_err());
    }
}
