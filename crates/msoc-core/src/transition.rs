//! Action execution and reward shaping
//!
//! Every action acts on the tile under the NPC. The shaped reward is returned
//! and also credited to the NPC's reward or penalty balance.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::ActionType;
use crate::config::SimulationConfig;
use crate::house::House;
use crate::ledger::MoneyLedger;
use crate::map::{ObjectKind, TileMap};
use crate::market::Market;
use crate::npc::Npc;
use crate::types::{Direction, Position, Resource};

pub const GATHER_REWARD: f32 = 10.0;
pub const GATHER_FULL_PENALTY: f32 = -2.0;
pub const MISSING_TARGET_PENALTY: f32 = -5.0;
pub const IDLE_PENALTY: f32 = -20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub reward: f32,
    pub success: bool,
}

impl ActionOutcome {
    fn ok(reward: f32) -> Self {
        Self {
            reward,
            success: true,
        }
    }

    fn failed(reward: f32) -> Self {
        Self {
            reward,
            success: false,
        }
    }
}

/// Mutable world state an action may touch
pub struct ActionContext<'a> {
    pub map: &'a mut TileMap,
    pub houses: &'a mut HashMap<Position, House>,
    pub market: &'a mut Market,
    pub ledger: &'a mut MoneyLedger,
    pub sim: &'a SimulationConfig,
}

/// Execute `action` for `npc`. `direction` steers Move; None picks one at random.
pub fn perform<R: Rng + ?Sized>(
    action: ActionType,
    npc: &mut Npc,
    ctx: &mut ActionContext<'_>,
    direction: Option<Direction>,
    rng: &mut R,
) -> ActionOutcome {
    let outcome = match action {
        ActionType::Move => {
            let dir = direction.unwrap_or_else(|| random_direction(rng));
            step(npc, ctx.map, dir);
            npc.consume_energy(1.0);
            ActionOutcome::ok(1.0)
        }
        ActionType::ChopTree => gather(npc, ctx, ObjectKind::Tree),
        ActionType::MineRock => gather(npc, ctx, ObjectKind::Rock),
        ActionType::GatherBush => gather(npc, ctx, ObjectKind::Bush),
        ActionType::StoreItem => store_item(npc, ctx),
        ActionType::UpgradeHouse => match ctx.houses.get_mut(&npc.position) {
            Some(house) => {
                if house.upgrade(npc) {
                    ActionOutcome::ok(20.0)
                } else {
                    ActionOutcome::failed(-10.0)
                }
            }
            None => ActionOutcome::failed(MISSING_TARGET_PENALTY),
        },
        ActionType::RegenerateEnergy => match ctx.houses.get(&npc.position) {
            Some(house) => {
                house.regenerate_energy(npc);
                ActionOutcome::ok(5.0)
            }
            None => ActionOutcome::failed(-1.0),
        },
        ActionType::TakeOutItems => take_out(npc, ctx),
        ActionType::BuyItem => {
            if ctx.map.object_at(npc.position) != Some(ObjectKind::Market) {
                ActionOutcome::failed(MISSING_TARGET_PENALTY)
            } else {
                let item = ctx.market.suggest_best_to_buy();
                if ctx.market.buy(npc, item, 1, ctx.ledger) {
                    ActionOutcome::ok(10.0)
                } else {
                    ActionOutcome::failed(-5.0)
                }
            }
        }
        ActionType::SellItem => {
            if ctx.map.object_at(npc.position) != Some(ObjectKind::Market) {
                ActionOutcome::failed(MISSING_TARGET_PENALTY)
            } else {
                let item = npc.inventory.first_item().map(str::to_owned);
                match item {
                    Some(item) if ctx.market.sell(npc, &item, 1, ctx.ledger) => {
                        ActionOutcome::ok(10.0)
                    }
                    _ => ActionOutcome::failed(-5.0),
                }
            }
        }
        ActionType::Rest => {
            if npc.energy() < npc.max_energy() {
                npc.regenerate_energy(npc.max_energy());
                ActionOutcome::ok(5.0)
            } else {
                ActionOutcome::failed(-1.0)
            }
        }
        ActionType::Explore => {
            let dir = random_direction(rng);
            step(npc, ctx.map, dir);
            npc.consume_energy(2.0);
            ActionOutcome::ok(5.0)
        }
        ActionType::None
        | ActionType::ProduceWater
        | ActionType::ProduceFood
        | ActionType::BreedWithNpc
        | ActionType::ConsumeGoods
        | ActionType::InvestMoney => ActionOutcome::failed(IDLE_PENALTY),
    };

    npc.last_action = action;
    npc.credit(outcome.reward);
    debug!(
        npc = %npc.name,
        action = %action,
        reward = outcome.reward,
        success = outcome.success,
        "action performed"
    );
    outcome
}

fn random_direction<R: Rng + ?Sized>(rng: &mut R) -> Direction {
    Direction::ALL[rng.gen_range(0..Direction::ALL.len())]
}

/// Move one tile, staying put at the map edge
fn step(npc: &mut Npc, map: &TileMap, dir: Direction) {
    let next = npc.position.offset(dir);
    if map.in_bounds(next) {
        npc.position = next;
    }
}

fn gather(npc: &mut Npc, ctx: &mut ActionContext<'_>, kind: ObjectKind) -> ActionOutcome {
    let Some(resource) = kind.resource() else {
        return ActionOutcome::failed(MISSING_TARGET_PENALTY);
    };
    let Some(tile) = ctx.map.get_mut(npc.position) else {
        return ActionOutcome::failed(MISSING_TARGET_PENALTY);
    };
    if tile.object != Some(kind) {
        return ActionOutcome::failed(MISSING_TARGET_PENALTY);
    }
    if !npc.inventory.add(resource.item(), 1) {
        return ActionOutcome::failed(GATHER_FULL_PENALTY);
    }
    tile.remove_object();
    npc.consume_energy(5.0);
    if resource == Resource::Bush {
        npc.hunger = (npc.hunger + ctx.sim.food_energy_boost).min(100.0);
    }
    debug!(npc = %npc.name, item = resource.item(), at = %npc.position, "resource gathered");
    ActionOutcome::ok(GATHER_REWARD)
}

fn store_item(npc: &mut Npc, ctx: &mut ActionContext<'_>) -> ActionOutcome {
    let Some(house) = ctx.houses.get_mut(&npc.position) else {
        return ActionOutcome::failed(MISSING_TARGET_PENALTY);
    };
    let Some(item) = npc.inventory.first_item().map(str::to_owned) else {
        return ActionOutcome::failed(-5.0);
    };
    if !house.store_item(&item, 1) {
        return ActionOutcome::failed(-5.0);
    }
    npc.inventory.remove(&item, 1);
    ActionOutcome::ok(5.0)
}

fn take_out(npc: &mut Npc, ctx: &mut ActionContext<'_>) -> ActionOutcome {
    let Some(house) = ctx.houses.get_mut(&npc.position) else {
        return ActionOutcome::failed(MISSING_TARGET_PENALTY);
    };
    let Some(item) = house.storage().first_item().map(str::to_owned) else {
        return ActionOutcome::failed(-5.0);
    };
    if house.take_from_storage(&item, 1, npc) {
        ActionOutcome::ok(5.0)
    } else {
        ActionOutcome::failed(-5.0)
    }
}
