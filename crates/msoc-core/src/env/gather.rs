//! Resource collection on a bare grid

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{check_action, Environment, Transition};
use crate::error::{Result, SocietyError};
use crate::types::{Direction, Position};

const STEP_PENALTY: f64 = -1.0;
const GATHER_REWARD: f64 = 10.0;
const COMPLETION_BONUS: f64 = 50.0;
const ACTIONS: usize = 5;
const KINDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherLayout {
    /// `count` of each resource anywhere on a `width` x `height` grid; start at the origin
    Uniform { width: i32, height: i32, count: usize },
    /// 64x64 grid with wood, stone and food in separate 10x10 zones; start at the centre
    Zoned,
}

impl Default for GatherLayout {
    fn default() -> Self {
        GatherLayout::Uniform {
            width: 10,
            height: 10,
            count: 5,
        }
    }
}

impl GatherLayout {
    /// Every resource must fit on its own cell and there must be something to gather
    pub fn validate(self) -> Result<()> {
        let GatherLayout::Uniform {
            width,
            height,
            count,
        } = self
        else {
            return Ok(());
        };
        if width <= 0 || height <= 0 {
            return Err(SocietyError::Config(format!(
                "gather grid must be non-empty, got {width}x{height}"
            )));
        }
        if count == 0 {
            return Err(SocietyError::Config(
                "gather layout needs at least one resource of each kind".to_string(),
            ));
        }
        let cells = usize::try_from(i64::from(width) * i64::from(height)).unwrap_or(usize::MAX);
        if count > cells {
            return Err(SocietyError::Config(format!(
                "{count} resources of each kind do not fit on a {width}x{height} grid"
            )));
        }
        Ok(())
    }

    fn size(self) -> (i32, i32) {
        match self {
            GatherLayout::Uniform { width, height, .. } => (width, height),
            GatherLayout::Zoned => (64, 64),
        }
    }

    fn count(self) -> usize {
        match self {
            GatherLayout::Uniform { count, .. } => count,
            GatherLayout::Zoned => 5,
        }
    }

    fn start(self) -> Position {
        match self {
            GatherLayout::Uniform { .. } => Position::new(0, 0),
            GatherLayout::Zoned => Position::new(32, 32),
        }
    }

    /// Candidate cells for resource kind `kind` (wood, stone, food)
    fn zone(self, kind: usize) -> Vec<Position> {
        let (lo, hi, w, h) = match self {
            GatherLayout::Uniform { width, height, .. } => (0, 0, width, height),
            GatherLayout::Zoned => {
                let lo = kind as i32 * 20;
                (lo, lo, 10, 10)
            }
        };
        (0..w)
            .flat_map(|x| (0..h).map(move |y| Position::new(lo + x, hi + y)))
            .collect()
    }
}

pub struct GatherEnv {
    layout: GatherLayout,
    max_steps: usize,
    rng: StdRng,
    player: Position,
    resources: [Vec<Position>; KINDS],
    inventory: [usize; KINDS],
    steps: usize,
    completed: bool,
}

impl GatherEnv {
    pub fn new(layout: GatherLayout, seed: u64) -> Result<Self> {
        layout.validate()?;
        let mut env = Self {
            layout,
            max_steps: 100,
            rng: StdRng::seed_from_u64(seed),
            player: layout.start(),
            resources: Default::default(),
            inventory: [0; KINDS],
            steps: 0,
            completed: false,
        };
        env.reset();
        Ok(env)
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn player(&self) -> Position {
        self.player
    }

    pub fn collected(&self) -> usize {
        self.inventory.iter().sum()
    }

    fn observation(&self) -> Vec<f32> {
        let (w, h) = self.layout.size();
        let n = self.layout.count().max(1) as f32;
        vec![
            self.player.x as f32 / w as f32,
            self.player.y as f32 / h as f32,
            self.inventory[0] as f32 / n,
            self.inventory[1] as f32 / n,
            self.inventory[2] as f32 / n,
            // energy and money slots, constant here
            1.0,
            1.0,
        ]
    }

    /// Pick up every resource under the player
    fn gather(&mut self) -> f64 {
        let mut reward = 0.0;
        for (kind, cells) in self.resources.iter_mut().enumerate() {
            if let Some(i) = cells.iter().position(|p| *p == self.player) {
                cells.swap_remove(i);
                self.inventory[kind] += 1;
                reward += GATHER_REWARD;
            }
        }
        reward
    }
}

impl Environment for GatherEnv {
    fn name(&self) -> &str {
        "gather"
    }

    fn observation_size(&self) -> usize {
        7
    }

    fn action_size(&self) -> usize {
        ACTIONS
    }

    fn reset(&mut self) -> Vec<f32> {
        let count = self.layout.count();
        for kind in 0..KINDS {
            let cells = self.layout.zone(kind);
            self.resources[kind] = cells
                .choose_multiple(&mut self.rng, count)
                .copied()
                .collect();
        }
        self.player = self.layout.start();
        self.inventory = [0; KINDS];
        self.steps = 0;
        self.completed = false;
        self.observation()
    }

    fn step(&mut self, action: usize) -> Result<Transition> {
        check_action(self.name(), action, ACTIONS)?;
        self.steps += 1;
        let mut reward = STEP_PENALTY;

        if action < 4 {
            let next = self.player.offset(Direction::ALL[action]);
            let (w, h) = self.layout.size();
            if next.x >= 0 && next.y >= 0 && next.x < w && next.y < h {
                self.player = next;
            }
        } else {
            reward += self.gather();
        }

        let mut done = false;
        if self.collected() == self.layout.count() * KINDS {
            done = true;
            self.completed = true;
            reward += COMPLETION_BONUS;
        }
        let truncated = !done && self.steps >= self.max_steps;

        Ok(Transition {
            observation: self.observation(),
            reward,
            done,
            truncated,
        })
    }

    fn is_success(&self) -> bool {
        self.completed
    }
}
