//! World and simulation tuning parameters

use serde::{Deserialize, Serialize};

use crate::error::{Result, SocietyError};

/// Static layout and entity limits for a generated world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Number of tiles horizontally
    pub map_width: i32,
    /// Number of tiles vertically
    pub map_height: i32,
    /// Number of NPCs spawned at world start
    pub npc_count: usize,
    /// Maximum inventory size an NPC can carry
    pub max_inventory_size: u32,
    /// Per-level resource requirement for house upgrades
    pub base_resource_requirement: u32,
    pub max_health: f32,
    pub max_energy: f32,
    /// Fraction of tiles holding a tree
    pub tree_density: f64,
    /// Fraction of tiles holding a rock
    pub rock_density: f64,
    /// Fraction of tiles holding a bush
    pub bush_density: f64,
    /// Starting money for each NPC
    pub starting_money: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            // 800px window over 32px tiles
            map_width: 25,
            map_height: 25,
            npc_count: 10,
            max_inventory_size: 10,
            base_resource_requirement: 3,
            max_health: 100.0,
            max_energy: 100.0,
            tree_density: 0.08,
            rock_density: 0.05,
            bush_density: 0.06,
            starting_money: 100.0,
        }
    }
}

impl WorldConfig {
    /// Reject layouts the generator cannot satisfy
    pub fn validate(&self) -> Result<()> {
        if self.map_width < 3 || self.map_height < 3 {
            return Err(SocietyError::Config(format!(
                "map must be at least 3x3, got {}x{}",
                self.map_width, self.map_height
            )));
        }
        let density = self.tree_density + self.rock_density + self.bush_density;
        if !(0.0..=0.9).contains(&density) {
            return Err(SocietyError::Config(format!(
                "combined object density must be within [0, 0.9], got {density:.2}"
            )));
        }
        let tiles = (i64::from(self.map_width) * i64::from(self.map_height)) as usize;
        // every NPC needs a free tile for its house, plus one for the market
        if self.npc_count + 1 > tiles / 2 {
            return Err(SocietyError::Config(format!(
                "{} NPCs do not fit on a {}x{} map",
                self.npc_count, self.map_width, self.map_height
            )));
        }
        Ok(())
    }
}

/// Tunable behaviour parameters for the simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Energy regeneration per time unit
    pub energy_regen_rate: f32,
    /// Health decay per time unit when conditions are bad
    pub health_decay_rate: f32,
    /// Energy boost from consuming food
    pub food_energy_boost: f32,
    /// Energy boost from consuming water
    pub water_energy_boost: f32,
    /// Baseline energy cost per heavy action
    pub action_energy_cost: f32,
    /// Energy recovered when resting
    pub rest_energy_recovery: f32,
    /// Minimum energy required to perform heavy actions
    pub min_energy_to_act: f32,
    /// Passive energy decay per second
    pub energy_decay_rate: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            energy_regen_rate: 1.0,
            health_decay_rate: 0.5,
            food_energy_boost: 20.0,
            water_energy_boost: 15.0,
            action_energy_cost: 10.0,
            rest_energy_recovery: 25.0,
            min_energy_to_act: 10.0,
            energy_decay_rate: 0.5,
        }
    }
}
