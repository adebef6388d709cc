//! Discretised observation of an NPC's surroundings

use serde::{Deserialize, Serialize};

use crate::map::{ObjectKind, TileMap};
use crate::npc::{Npc, MAX_ENERGY};

/// Number of features in [`State::to_features`]
pub const STATE_SIZE: usize = 7;
pub const ENERGY_LEVELS: i32 = 3;
pub const INVENTORY_LEVELS: i32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub pos_x: i32,
    pub pos_y: i32,
    pub nearby_trees: i32,
    pub nearby_rocks: i32,
    pub nearby_bushes: i32,
    pub energy_level: i32,
    pub inventory_level: i32,
}

/// Bucket `value` in `[min, max]` into `levels` evenly spaced levels
pub fn quantize(value: f32, min: f32, max: f32, levels: i32) -> i32 {
    if levels <= 1 || max <= min {
        return 0;
    }
    let scaled = ((value - min) * (levels - 1) as f32 / (max - min)).round() as i32;
    scaled.clamp(0, levels - 1)
}

impl State {
    pub fn observe(map: &TileMap, npc: &Npc) -> Self {
        let pos = npc.position;
        Self {
            pos_x: pos.x,
            pos_y: pos.y,
            nearby_trees: map.count_nearby(pos, ObjectKind::Tree),
            nearby_rocks: map.count_nearby(pos, ObjectKind::Rock),
            nearby_bushes: map.count_nearby(pos, ObjectKind::Bush),
            energy_level: quantize(npc.energy(), 0.0, MAX_ENERGY, ENERGY_LEVELS),
            inventory_level: quantize(
                npc.inventory.total() as f32,
                0.0,
                npc.inventory.capacity() as f32,
                INVENTORY_LEVELS,
            ),
        }
    }

    pub fn to_features(&self) -> [f32; STATE_SIZE] {
        [
            self.pos_x as f32,
            self.pos_y as f32,
            self.nearby_trees as f32,
            self.nearby_rocks as f32,
            self.nearby_bushes as f32,
            self.energy_level as f32,
            self.inventory_level as f32,
        ]
    }

    pub fn from_features(features: &[f32]) -> Option<Self> {
        if features.len() != STATE_SIZE {
            return None;
        }
        let f = |i: usize| features[i].round() as i32;
        Some(Self {
            pos_x: f(0),
            pos_y: f(1),
            nearby_trees: f(2),
            nearby_rocks: f(3),
            nearby_bushes: f(4),
            energy_level: f(5),
            inventory_level: f(6),
        })
    }
}
