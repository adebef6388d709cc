//! One learner-controlled NPC living in a full world

use tracing::debug;

use super::{check_action, Environment, Transition};
use crate::action::{ActionType, TRAINABLE_ACTIONS};
use crate::config::{SimulationConfig, WorldConfig};
use crate::error::{Result, SocietyError};
use crate::npc::DEATH_PENALTY;
use crate::state::{State, STATE_SIZE};
use crate::world::World;

pub const DEFAULT_MAX_STEPS: usize = 500;
const CONTROLLED: usize = 0;

/// NPC 0 follows the learner, the rest of the population uses the rule policy
pub struct SocietyEnv {
    config: WorldConfig,
    sim: SimulationConfig,
    seed: u64,
    episode: u64,
    max_steps: usize,
    steps: usize,
    world: World,
    alive_at_end: bool,
}

impl SocietyEnv {
    pub fn new(config: WorldConfig, sim: SimulationConfig, seed: u64) -> Result<Self> {
        let world = World::generate(config.clone(), sim.clone(), seed)?;
        if world.npcs.is_empty() {
            return Err(SocietyError::Config(
                "society environment needs at least one npc".to_string(),
            ));
        }
        Ok(Self {
            config,
            sim,
            seed,
            episode: 0,
            max_steps: DEFAULT_MAX_STEPS,
            steps: 0,
            world,
            alive_at_end: false,
        })
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    fn observation(&self) -> Vec<f32> {
        self.world
            .observe(CONTROLLED)
            .map(|state| state.to_features().to_vec())
            .unwrap_or_else(|_| State::default().to_features().to_vec())
    }
}

impl Environment for SocietyEnv {
    fn name(&self) -> &str {
        "society"
    }

    fn observation_size(&self) -> usize {
        STATE_SIZE
    }

    fn action_size(&self) -> usize {
        TRAINABLE_ACTIONS
    }

    fn reset(&mut self) -> Vec<f32> {
        self.episode += 1;
        let seed = self.seed.wrapping_add(self.episode);
        match World::generate(self.config.clone(), self.sim.clone(), seed) {
            Ok(world) => self.world = world,
            // the config already generated once, so only log and keep the old world
            Err(e) => debug!(error = %e, "world regeneration failed"),
        }
        self.steps = 0;
        self.alive_at_end = false;
        self.observation()
    }

    fn step(&mut self, action: usize) -> Result<Transition> {
        check_action(self.name(), action, TRAINABLE_ACTIONS)?;
        let action_type = ActionType::from_trainable_index(action)
            .ok_or_else(|| SocietyError::InvalidAction(format!("action {action}")))?;

        let outcome = self.world.step_npc(CONTROLLED, action_type)?;
        for index in 1..self.world.npcs.len() {
            self.world.auto_step(index)?;
        }
        self.world.tick(1.0);
        self.steps += 1;

        let mut reward = f64::from(outcome.reward);
        let done = self.world.npc(CONTROLLED)?.is_dead();
        if done {
            reward += f64::from(DEATH_PENALTY);
        }
        let truncated = !done && self.steps >= self.max_steps;
        if truncated {
            self.alive_at_end = true;
        }

        Ok(Transition {
            observation: self.observation(),
            reward,
            done,
            truncated,
        })
    }

    /// Survived until the step limit
    fn is_success(&self) -> bool {
        self.alive_at_end
    }
}
