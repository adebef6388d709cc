//! Single-agent survival economy over an abstract state vector

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{check_action, Environment, Transition};
use crate::error::Result;

const HEALTH: usize = 0;
const ENERGY: usize = 1;
const WOOD: usize = 2;
const STONE: usize = 3;
const MONEY: usize = 5;

pub const INITIAL_STATE: [f32; 6] = [100.0, 100.0, 0.0, 0.0, 0.0, 50.0];

/// State layout: health, energy, wood, stone, food, money.
/// Actions: 0 move, 1 gather, 2 trade, 3 rest.
pub struct EconomyEnv {
    state: [f32; 6],
    rng: StdRng,
    steps: usize,
    max_steps: usize,
    survived: bool,
}

impl EconomyEnv {
    pub fn new(seed: u64) -> Self {
        Self {
            state: INITIAL_STATE,
            rng: StdRng::seed_from_u64(seed),
            steps: 0,
            max_steps: 500,
            survived: false,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn state(&self) -> [f32; 6] {
        self.state
    }
}

impl Environment for EconomyEnv {
    fn name(&self) -> &str {
        "economy"
    }

    fn observation_size(&self) -> usize {
        6
    }

    fn action_size(&self) -> usize {
        4
    }

    fn reset(&mut self) -> Vec<f32> {
        self.state = INITIAL_STATE;
        self.steps = 0;
        self.survived = false;
        self.state.to_vec()
    }

    fn step(&mut self, action: usize) -> Result<Transition> {
        check_action(self.name(), action, 4)?;
        self.steps += 1;
        let s = &mut self.state;

        let mut reward = match action {
            0 => {
                s[ENERGY] -= 5.0;
                1.0
            }
            1 if s[ENERGY] > 10.0 => {
                s[WOOD] += self.rng.gen_range(1..=2) as f32;
                s[STONE] += self.rng.gen_range(1..=2) as f32;
                s[ENERGY] -= 10.0;
                5.0 + f64::from(s[WOOD] + s[STONE]) * 2.0
            }
            1 => -10.0,
            2 if s[WOOD] > 0.0 || s[STONE] > 0.0 => {
                s[MONEY] += (s[WOOD] + s[STONE]) * 3.0;
                s[WOOD] = 0.0;
                s[STONE] = 0.0;
                10.0
            }
            2 => -5.0,
            _ => {
                s[ENERGY] = (s[ENERGY] + 15.0).min(100.0);
                2.0
            }
        };

        let done = s[ENERGY] <= 0.0 || s[HEALTH] <= 0.0;
        if done {
            reward = -50.0;
        }
        let truncated = !done && self.steps >= self.max_steps;
        if truncated {
            self.survived = true;
        }

        Ok(Transition {
            observation: self.state.to_vec(),
            reward,
            done,
            truncated,
        })
    }

    fn is_success(&self) -> bool {
        self.survived
    }
}
