//! Action types an NPC can attempt
//!
//! The integer codes are part of the exported experience format and must
//! stay stable.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Actions a learner may choose: Move (code 1) through Rest (code 11)
pub const TRAINABLE_ACTIONS: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionType {
    None,
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
    Explore,
    ProduceWater,
    ProduceFood,
    BreedWithNpc,
    ConsumeGoods,
    InvestMoney,
}

impl ActionType {
    pub const ALL: [ActionType; 18] = [
        ActionType::None,
        ActionType::Move,
        ActionType::ChopTree,
        ActionType::MineRock,
        ActionType::GatherBush,
        ActionType::StoreItem,
        ActionType::UpgradeHouse,
        ActionType::RegenerateEnergy,
        ActionType::TakeOutItems,
        ActionType::BuyItem,
        ActionType::SellItem,
        ActionType::Rest,
        ActionType::Explore,
        ActionType::ProduceWater,
        ActionType::ProduceFood,
        ActionType::BreedWithNpc,
        ActionType::ConsumeGoods,
        ActionType::InvestMoney,
    ];

    /// Stable wire code
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    /// Trainable action at `index`, so index 0 is Move
    pub fn from_trainable_index(index: usize) -> Option<Self> {
        if index < TRAINABLE_ACTIONS {
            Self::ALL.get(index + 1).copied()
        } else {
            None
        }
    }

    /// Inverse of [`ActionType::from_trainable_index`]
    pub fn trainable_index(self) -> Option<usize> {
        let code = self.code();
        (1..=TRAINABLE_ACTIONS as i32)
            .contains(&code)
            .then(|| (code - 1) as usize)
    }

    pub fn name(self) -> &'static str {
        match self {
            ActionType::None => "None",
            ActionType::Move => "Move",
            ActionType::ChopTree => "ChopTree",
            ActionType::MineRock => "MineRock",
            ActionType::GatherBush => "GatherBush",
            ActionType::StoreItem => "StoreItem",
            ActionType::UpgradeHouse => "UpgradeHouse",
            ActionType::RegenerateEnergy => "RegenerateEnergy",
            ActionType::TakeOutItems => "TakeOutItems",
            ActionType::BuyItem => "BuyItem",
            ActionType::SellItem => "SellItem",
            ActionType::Rest => "Rest",
            ActionType::Explore => "Explore",
            ActionType::ProduceWater => "ProduceWater",
            ActionType::ProduceFood => "ProduceFood",
            ActionType::BreedWithNpc => "BreedWithNPC",
            ActionType::ConsumeGoods => "ConsumeGoods",
            ActionType::InvestMoney => "InvestMoney",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ActionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for ActionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i32::deserialize(deserializer)?;
        ActionType::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown action code {code}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_positional() {
        for (idx, action) in ActionType::ALL.iter().enumerate() {
            assert_eq!(action.code(), idx as i32);
            assert_eq!(ActionType::from_code(idx as i32), Some(*action));
        }
    }

    #[test]
    fn test_known_codes() {
        assert_eq!(ActionType::Move.code(), 1);
        assert_eq!(ActionType::Rest.code(), 11);
        assert_eq!(ActionType::InvestMoney.code(), 17);
        assert_eq!(ActionType::from_code(-1), None);
        assert_eq!(ActionType::from_code(18), None);
    }

    #[test]
    fn test_trainable_range() {
        assert_eq!(ActionType::from_trainable_index(0), Some(ActionType::Move));
        assert_eq!(ActionType::from_trainable_index(10), Some(ActionType::Rest));
        assert_eq!(ActionType::from_trainable_index(11), None);
        assert_eq!(ActionType::Rest.trainable_index(), Some(10));
        assert_eq!(ActionType::None.trainable_index(), None);
        assert_eq!(ActionType::Explore.trainable_index(), None);
    }

    #[test]
    fn test_serializes_as_code() {
        let json = serde_json::to_string(&ActionType::SellItem).unwrap();
        assert_eq!(json, "10");
        let parsed: ActionType = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, ActionType::MineRock);
        assert!(serde_json::from_str::<ActionType>("99").is_err());
    }
}
