//! The simulated society: map, NPCs, houses and the market under one clock

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::action::ActionType;
use crate::config::{SimulationConfig, WorldConfig};
use crate::error::{Result, SocietyError};
use crate::house::House;
use crate::ledger::MoneyLedger;
use crate::map::{ObjectKind, TileMap};
use crate::market::Market;
use crate::npc::Npc;
use crate::state::State;
use crate::time::TimeManager;
use crate::transition::{self, ActionContext, ActionOutcome};
use crate::types::{Direction, Position};

pub struct World {
    pub config: WorldConfig,
    pub sim: SimulationConfig,
    pub map: TileMap,
    pub npcs: Vec<Npc>,
    pub houses: HashMap<Position, House>,
    pub market: Market,
    pub ledger: MoneyLedger,
    pub time: TimeManager,
    market_position: Position,
    rng: StdRng,
}

impl World {
    /// Build a world deterministically from `seed`
    pub fn generate(config: WorldConfig, sim: SimulationConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut map = TileMap::generate(&config, &mut rng);

        let centre = Position::new(config.map_width / 2, config.map_height / 2);
        // the market sits on the centre tile, clearing whatever grew there
        map.get_mut(centre)
            .ok_or(SocietyError::OutOfBounds {
                x: centre.x,
                y: centre.y,
            })?
            .place_object(ObjectKind::Market);
        let market = Market::new(&mut rng);

        let mut free = map.free_positions();
        if free.len() < config.npc_count {
            return Err(SocietyError::Config(format!(
                "only {} free tiles for {} NPCs",
                free.len(),
                config.npc_count
            )));
        }
        free.shuffle(&mut rng);

        let mut npcs = Vec::with_capacity(config.npc_count);
        let mut houses = HashMap::with_capacity(config.npc_count);
        for (i, pos) in free.into_iter().take(config.npc_count).enumerate() {
            if let Some(tile) = map.get_mut(pos) {
                tile.place_object(ObjectKind::House);
            }
            houses.insert(
                pos,
                House::new(1).with_base_requirement(config.base_resource_requirement),
            );
            let mut npc = Npc::new(format!("NPC_{}", i + 1), pos, &config);
            npc.home = Some(pos);
            npcs.push(npc);
        }

        info!(
            width = config.map_width,
            height = config.map_height,
            npcs = npcs.len(),
            seed,
            "world generated"
        );

        Ok(Self {
            config,
            sim,
            map,
            npcs,
            houses,
            market,
            ledger: MoneyLedger::new(),
            time: TimeManager::default(),
            market_position: centre,
            rng,
        })
    }

    pub fn market_position(&self) -> Position {
        self.market_position
    }

    pub fn npc(&self, index: usize) -> Result<&Npc> {
        self.npcs
            .get(index)
            .ok_or_else(|| SocietyError::NotFound(format!("npc {index}")))
    }

    pub fn npc_mut(&mut self, index: usize) -> Result<&mut Npc> {
        self.npcs
            .get_mut(index)
            .ok_or_else(|| SocietyError::NotFound(format!("npc {index}")))
    }

    pub fn step_npc(&mut self, index: usize, action: ActionType) -> Result<ActionOutcome> {
        self.step_npc_toward(index, action, None)
    }

    /// Perform `action` for NPC `index`; `direction` only matters for Move
    pub fn step_npc_toward(
        &mut self,
        index: usize,
        action: ActionType,
        direction: Option<Direction>,
    ) -> Result<ActionOutcome> {
        let Self {
            sim,
            map,
            npcs,
            houses,
            market,
            ledger,
            rng,
            ..
        } = self;
        let npc = npcs
            .get_mut(index)
            .ok_or_else(|| SocietyError::NotFound(format!("npc {index}")))?;
        if npc.is_dead() {
            return Err(SocietyError::InvalidAction(format!(
                "{} is dead and cannot {action}",
                npc.name
            )));
        }
        let mut ctx = ActionContext {
            map,
            houses,
            market,
            ledger,
            sim,
        };
        Ok(transition::perform(action, npc, &mut ctx, direction, rng))
    }

    /// Let the rule-based policy pick and perform an action for a ready NPC
    pub fn auto_step(&mut self, index: usize) -> Result<Option<(ActionType, ActionOutcome)>> {
        let npc = self.npc(index)?;
        if npc.is_dead() || !npc.ready() {
            return Ok(None);
        }
        let Self { map, npcs, .. } = self;
        let action = npcs[index].decide_next_action(map);
        let outcome = self.step_npc(index, action)?;
        Ok(Some((action, outcome)))
    }

    /// Advance the clock by `dt` seconds. Returns how many NPCs died this tick.
    pub fn tick(&mut self, dt: f32) -> usize {
        self.time.update(dt);
        let mut deaths = 0;
        for npc in &mut self.npcs {
            if npc.update(dt) {
                deaths += 1;
            }
        }
        self.market.simulate_dynamics(dt, &mut self.rng);
        if deaths > 0 {
            debug!(deaths, alive = self.alive_count(), "npcs died");
        }
        deaths
    }

    pub fn observe(&self, index: usize) -> Result<State> {
        Ok(State::observe(&self.map, self.npc(index)?))
    }

    pub fn alive_count(&self) -> usize {
        self.npcs.iter().filter(|npc| !npc.is_dead()).count()
    }

    pub fn total_money(&self) -> f64 {
        MoneyLedger::total_money(&self.npcs)
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}
