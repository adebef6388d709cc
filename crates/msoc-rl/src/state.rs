//! Action and reward types for RL

use serde::{Deserialize, Serialize};

use msoc_core::ActionType;

/// Reward value from environment
pub type Reward = f64;

/// Trainable NPC action. Discrete index `i` is action code `i + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Move,
    ChopTree,
    MineRock,
    GatherBush,
    StoreItem,
    UpgradeHouse,
    RegenerateEnergy,
    TakeOutItems,
    BuyItem,
    SellItem,
    Rest,
}

impl Action {
    pub const ALL: [Action; 11] = [
        Action::Move,
        Action::ChopTree,
        Action::MineRock,
        Action::GatherBush,
        Action::StoreItem,
        Action::UpgradeHouse,
        Action::RegenerateEnergy,
        Action::TakeOutItems,
        Action::BuyItem,
        Action::SellItem,
        Action::Rest,
    ];

    /// Convert action to index for discrete action spaces
    pub fn to_index(self) -> usize {
        self as usize
    }

    /// Create action from index (for discrete action spaces)
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Map an exported action code to a trainable action
    pub fn from_code(code: i32) -> Option<Self> {
        ActionType::from_code(code)
            .and_then(ActionType::trainable_index)
            .and_then(Self::from_index)
    }

    pub fn code(self) -> i32 {
        self.to_index() as i32 + 1
    }

    pub fn action_type(self) -> ActionType {
        ActionType::from_trainable_index(self.to_index()).unwrap_or(ActionType::None)
    }

    pub fn name(self) -> &'static str {
        self.action_type().name()
    }

    /// Get action space size for discrete actions
    pub fn action_space_size() -> usize {
        Self::ALL.len()
    }
}

/// Display name for a discrete action index, falling back to the number
pub fn action_label(index: usize) -> String {
    Action::from_index(index).map_or_else(|| format!("action_{index}"), |a| a.name().to_string())
}
