//! Non-player characters and their rule-based fallback policy

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::action::ActionType;
use crate::config::WorldConfig;
use crate::inventory::Inventory;
use crate::map::{ObjectKind, TileMap};
use crate::types::Position;

/// Unique NPC identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NpcId(pub Uuid);

impl NpcId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NpcId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub const MAX_HEALTH: f32 = 100.0;
pub const MAX_ENERGY: f32 = 100.0;
pub const DEATH_PENALTY: f32 = -100.0;
pub const ACTION_COOLDOWN: f32 = 2.0;
pub const ENERGY_DECAY_PER_SECOND: f32 = 0.5;
pub const INITIAL_HUNGER: f32 = 50.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Npc {
    pub id: NpcId,
    pub name: String,
    health: f32,
    pub hunger: f32,
    energy: f32,
    pub speed: f32,
    pub strength: f32,
    pub money: f32,
    pub position: Position,
    pub inventory: Inventory,
    reward_balance: f32,
    penalty_balance: f32,
    action_cooldown: f32,
    dead: bool,
    death_handled: bool,
    pub last_action: ActionType,
    /// Tile of the house this NPC owns
    pub home: Option<Position>,
}

impl Npc {
    pub fn new(name: impl Into<String>, position: Position, config: &WorldConfig) -> Self {
        Self {
            id: NpcId::new(),
            name: name.into(),
            health: config.max_health.min(MAX_HEALTH),
            hunger: INITIAL_HUNGER,
            energy: config.max_energy.min(MAX_ENERGY),
            speed: 1.0,
            strength: 10.0,
            money: config.starting_money,
            position,
            inventory: Inventory::with_capacity(config.max_inventory_size),
            reward_balance: 0.0,
            penalty_balance: 0.0,
            action_cooldown: 0.0,
            dead: false,
            death_handled: false,
            last_action: ActionType::None,
            home: None,
        }
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn energy(&self) -> f32 {
        self.energy
    }

    pub fn max_energy(&self) -> f32 {
        MAX_ENERGY
    }

    pub fn energy_percentage(&self) -> f32 {
        self.energy / MAX_ENERGY
    }

    pub fn consume_energy(&mut self, amount: f32) {
        self.energy = (self.energy - amount).max(0.0);
        if self.energy == 0.0 {
            debug!(npc = %self.name, "out of energy");
        }
    }

    pub fn regenerate_energy(&mut self, rate: f32) {
        if self.energy < MAX_ENERGY {
            self.energy = (self.energy + rate).min(MAX_ENERGY);
        }
    }

    pub fn set_health(&mut self, health: f32) {
        self.health = health.clamp(0.0, MAX_HEALTH);
        if self.health == 0.0 {
            self.dead = true;
        }
    }

    pub fn is_dead(&self) -> bool {
        self.dead || self.energy == 0.0 || self.health == 0.0
    }

    pub fn cooldown(&self) -> f32 {
        self.action_cooldown
    }

    pub fn ready(&self) -> bool {
        self.action_cooldown <= 0.0
    }

    /// Advance timers and passive decay. Returns true on the tick the NPC dies.
    pub fn update(&mut self, dt: f32) -> bool {
        if self.action_cooldown > 0.0 {
            self.action_cooldown = (self.action_cooldown - dt).max(0.0);
        }
        if self.energy > 0.0 {
            self.energy = (self.energy - dt * ENERGY_DECAY_PER_SECOND).max(0.0);
        }
        if self.is_dead() && !self.death_handled {
            self.handle_death();
            return true;
        }
        false
    }

    fn handle_death(&mut self) {
        info!(npc = %self.name, "npc died");
        self.dead = true;
        self.death_handled = true;
        self.add_penalty(DEATH_PENALTY);
    }

    pub fn add_reward(&mut self, reward: f32) {
        self.reward_balance += reward;
    }

    /// Penalties are stored with their sign
    pub fn add_penalty(&mut self, penalty: f32) {
        self.penalty_balance += penalty;
    }

    /// Credit a shaped reward to the matching balance
    pub fn credit(&mut self, reward: f32) {
        if reward >= 0.0 {
            self.add_reward(reward);
        } else {
            self.add_penalty(reward);
        }
    }

    pub fn reward_balance(&self) -> f32 {
        self.reward_balance
    }

    pub fn penalty_balance(&self) -> f32 {
        self.penalty_balance
    }

    pub fn net_reward(&self) -> f32 {
        self.reward_balance + self.penalty_balance
    }

    /// Rule-based policy for NPCs not driven by a learner
    pub fn decide_next_action(&mut self, map: &TileMap) -> ActionType {
        self.action_cooldown = ACTION_COOLDOWN;
        if self.energy < 20.0 {
            return ActionType::RegenerateEnergy;
        }
        if self.hunger < 30.0 {
            return ActionType::GatherBush;
        }
        for kind in map.scan_nearby(self.position) {
            match kind {
                ObjectKind::Tree => return ActionType::ChopTree,
                ObjectKind::Rock => return ActionType::MineRock,
                ObjectKind::Bush => return ActionType::GatherBush,
                ObjectKind::House | ObjectKind::Market => {}
            }
        }
        if self.inventory.is_full() {
            return ActionType::StoreItem;
        }
        ActionType::Explore
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_npc() -> Npc {
        Npc::new("Tester", Position::new(2, 2), &WorldConfig::default())
    }

    #[test]
    fn test_energy_clamps() {
        let mut npc = create_test_npc();
        npc.consume_energy(250.0);
        assert_eq!(npc.energy(), 0.0);
        assert!(npc.is_dead());
        npc.regenerate_energy(500.0);
        assert_eq!(npc.energy(), MAX_ENERGY);
    }

    #[test]
    fn test_zero_health_marks_dead() {
        let mut npc = create_test_npc();
        npc.set_health(-5.0);
        assert_eq!(npc.health(), 0.0);
        assert!(npc.is_dead());
        npc.set_health(50.0);
        assert!(npc.is_dead());
    }

    #[test]
    fn test_update_decays_and_penalises_death_once() {
        let mut npc = create_test_npc();
        assert!(!npc.update(2.0));
        assert_eq!(npc.energy(), 99.0);

        npc.consume_energy(99.0);
        assert!(npc.update(1.0));
        assert!(!npc.update(1.0));
        assert_eq!(npc.penalty_balance(), DEATH_PENALTY);
    }

    #[test]
    fn test_cooldown_floors_at_zero() {
        let mut npc = create_test_npc();
        let map = TileMap::new(5, 5);
        npc.decide_next_action(&map);
        assert_eq!(npc.cooldown(), ACTION_COOLDOWN);
        npc.update(5.0);
        assert_eq!(npc.cooldown(), 0.0);
        assert!(npc.ready());
    }

    #[test]
    fn test_decide_prefers_energy_then_hunger() {
        let map = TileMap::new(5, 5);
        let mut npc = create_test_npc();
        npc.consume_energy(85.0);
        assert_eq!(npc.decide_next_action(&map), ActionType::RegenerateEnergy);

        let mut npc = create_test_npc();
        npc.hunger = 10.0;
        assert_eq!(npc.decide_next_action(&map), ActionType::GatherBush);
    }

    #[test]
    fn test_decide_uses_scan_order() {
        let mut map = TileMap::new(5, 5);
        map.get_mut(Position::new(1, 1)).unwrap().place_object(ObjectKind::Rock);
        map.get_mut(Position::new(3, 3)).unwrap().place_object(ObjectKind::Tree);
        let mut npc = create_test_npc();
        assert_eq!(npc.decide_next_action(&map), ActionType::MineRock);
    }

    #[test]
    fn test_decide_full_inventory_then_explore() {
        let map = TileMap::new(5, 5);
        let mut npc = create_test_npc();
        assert_eq!(npc.decide_next_action(&map), ActionType::Explore);
        npc.inventory.add("wood", 10);
        assert_eq!(npc.decide_next_action(&map), ActionType::StoreItem);
    }

    #[test]
    fn test_credit_splits_balances() {
        let mut npc = create_test_npc();
        npc.credit(10.0);
        npc.credit(-4.0);
        assert_eq!(npc.reward_balance(), 10.0);
        assert_eq!(npc.penalty_balance(), -4.0);
        assert_eq!(npc.net_reward(), 6.0);
    }
}
