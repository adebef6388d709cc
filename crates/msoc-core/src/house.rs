//! NPC-owned houses: storage, energy regeneration and upgrades

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::inventory::Inventory;
use crate::npc::Npc;

pub const UPGRADE_COST_PER_LEVEL: f32 = 50.0;
pub const BASE_RESOURCE_REQUIREMENT: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct House {
    level: u32,
    energy_regen_rate: f32,
    health_bonus: f32,
    strength_bonus: f32,
    speed_bonus: f32,
    base_requirement: u32,
    storage: Inventory,
}

impl Default for House {
    fn default() -> Self {
        Self::new(1)
    }
}

impl House {
    pub fn new(level: u32) -> Self {
        let l = level as f32;
        Self {
            level,
            energy_regen_rate: 2.0 * l,
            health_bonus: 5.0 * l,
            strength_bonus: 2.0 * l,
            speed_bonus: l,
            base_requirement: BASE_RESOURCE_REQUIREMENT,
            storage: Inventory::with_capacity(10 * level),
        }
    }

    pub fn with_base_requirement(mut self, base: u32) -> Self {
        self.base_requirement = base;
        self
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn max_storage(&self) -> u32 {
        self.storage.capacity()
    }

    pub fn energy_regen_rate(&self) -> f32 {
        self.energy_regen_rate
    }

    pub fn health_bonus(&self) -> f32 {
        self.health_bonus
    }

    pub fn strength_bonus(&self) -> f32 {
        self.strength_bonus
    }

    pub fn speed_bonus(&self) -> f32 {
        self.speed_bonus
    }

    pub fn storage(&self) -> &Inventory {
        &self.storage
    }

    pub fn stored(&self, item: &str) -> u32 {
        self.storage.count(item)
    }

    pub fn is_storage_full(&self) -> bool {
        self.storage.is_full()
    }

    pub fn regenerate_energy(&self, npc: &mut Npc) {
        npc.regenerate_energy(self.energy_regen_rate);
    }

    pub fn store_item(&mut self, item: &str, qty: u32) -> bool {
        if !self.storage.add(item, qty) {
            debug!(item, qty, "house storage full");
            return false;
        }
        true
    }

    /// Move items from storage into the NPC's inventory
    pub fn take_from_storage(&mut self, item: &str, qty: u32, npc: &mut Npc) -> bool {
        if self.storage.count(item) < qty || !npc.inventory.has_space(qty) {
            return false;
        }
        self.storage.remove(item, qty) && npc.inventory.add(item, qty)
    }

    pub fn upgrade_cost(&self) -> f32 {
        self.level as f32 * UPGRADE_COST_PER_LEVEL
    }

    pub fn can_afford_upgrade(&self, money: f32) -> bool {
        money >= self.upgrade_cost()
    }

    /// Charge the NPC and raise the house one level
    pub fn upgrade(&mut self, npc: &mut Npc) -> bool {
        let cost = self.upgrade_cost();
        if npc.money < cost {
            debug!(npc = %npc.name, cost, money = npc.money, "cannot afford house upgrade");
            return false;
        }
        npc.money -= cost;
        self.level += 1;
        self.storage.upgrade_capacity(10);
        self.energy_regen_rate += 1.0;
        self.health_bonus += 5.0;
        self.strength_bonus += 2.0;
        self.speed_bonus += 1.0;
        info!(npc = %npc.name, level = self.level, "house upgraded");
        true
    }

    /// Units of `item` needed for the next upgrade
    pub fn resource_requirement(&self, _item: &str) -> u32 {
        self.base_requirement * self.level
    }

    pub fn apply_stat_bonuses(&self, npc: &mut Npc) {
        npc.set_health(npc.health() + self.health_bonus);
        npc.strength += self.strength_bonus;
        npc.speed += self.speed_bonus;
    }

    pub fn remove_stat_bonuses(&self, npc: &mut Npc) {
        npc.set_health(npc.health() - self.health_bonus);
        npc.strength -= self.strength_bonus;
        npc.speed -= self.speed_bonus;
    }
}
