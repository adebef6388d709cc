//! On-disk experience record

use msoc_core::{ActionType, State};
use msoc_rl::Experience;
use serde::{Deserialize, Serialize};

/// One transition as written to session and export files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceRecord {
    pub state: State,
    /// `ActionType` code, 1..=11 for trainable actions
    pub action: i32,
    pub reward: f32,
    pub next_state: State,
    pub done: bool,
    pub npc_name: String,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

impl ExperienceRecord {
    pub fn new(
        state: State,
        action: ActionType,
        reward: f32,
        next_state: State,
        done: bool,
        npc_name: impl Into<String>,
    ) -> Self {
        Self {
            state,
            action: action.code(),
            reward,
            next_state,
            done,
            npc_name: npc_name.into(),
            timestamp: chrono::Utc::now().timestamp() as f64,
        }
    }

    pub fn action_type(&self) -> Option<ActionType> {
        ActionType::from_code(self.action)
    }

    /// Trainable index, with untrainable codes falling back to 0
    pub fn action_index(&self) -> usize {
        self.action_type()
            .and_then(ActionType::trainable_index)
            .unwrap_or(0)
    }

    pub fn to_experience(&self) -> Experience {
        Experience::new(
            self.state.to_features().to_vec(),
            self.action_index(),
            f64::from(self.reward),
            self.next_state.to_features().to_vec(),
            self.done,
        )
    }
}
