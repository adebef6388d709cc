//! Episodic environments for training agents
//!
//! All environments expose flat `f32` observations and discrete actions
//! numbered from zero, so a learner can drive any of them.

mod economy;
mod gather;
mod society;

pub use economy::EconomyEnv;
pub use gather::{GatherEnv, GatherLayout};
pub use society::SocietyEnv;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Result of one environment step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub observation: Vec<f32>,
    pub reward: f64,
    /// Episode ended on its own terms
    pub done: bool,
    /// Episode was cut off by the step limit
    pub truncated: bool,
}

impl Transition {
    pub fn is_terminal(&self) -> bool {
        self.done || self.truncated
    }
}

pub trait Environment: Send {
    fn name(&self) -> &str;

    fn observation_size(&self) -> usize;

    fn action_size(&self) -> usize;

    /// Start a new episode and return the first observation
    fn reset(&mut self) -> Vec<f32>;

    fn step(&mut self, action: usize) -> Result<Transition>;

    /// Whether the last finished episode reached its goal
    fn is_success(&self) -> bool;
}

pub(crate) fn check_action(env: &str, action: usize, size: usize) -> Result<()> {
    if action >= size {
        return Err(crate::error::SocietyError::InvalidAction(format!(
            "{env}: action {action} outside 0..{size}"
        )));
    }
    Ok(())
}
