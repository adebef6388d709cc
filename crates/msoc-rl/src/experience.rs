//! Experience replay buffer for RL

use std::collections::VecDeque;

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::state::Reward;

/// A single experience tuple (s, a, r, s', done)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub state: Vec<f32>,
    pub action: usize,
    pub reward: Reward,
    /// Empty when the successor is unknown
    pub next_state: Vec<f32>,
    pub done: bool,
}

impl Experience {
    /// Create a new experience
    pub fn new(
        state: Vec<f32>,
        action: usize,
        reward: Reward,
        next_state: Vec<f32>,
        done: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            done,
        }
    }
}

/// Experience replay buffer
#[derive(Debug, Clone)]
pub struct ExperienceBuffer {
    buffer: VecDeque<Experience>,
    capacity: usize,
}

impl ExperienceBuffer {
    /// Create a new experience buffer with given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity.min(1 << 16)),
            capacity: capacity.max(1),
        }
    }

    /// Add an experience, evicting the oldest when full
    pub fn push(&mut self, experience: Experience) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(experience);
    }

    /// Sample up to `batch_size` distinct experiences
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<Experience> {
        let amount = batch_size.min(self.buffer.len());
        index::sample(rng, self.buffer.len(), amount)
            .into_iter()
            .filter_map(|i| self.buffer.get(i).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.buffer.iter()
    }
}

impl Default for ExperienceBuffer {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn create_test_experience(reward: f64) -> Experience {
        Experience::new(vec![0.0; 7], 1, reward, vec![1.0; 7], false)
    }

    #[test]
    fn test_buffer_push_and_len() {
        let mut buffer = ExperienceBuffer::new(100);
        assert!(buffer.is_empty());
        buffer.push(create_test_experience(0.5));
        assert_eq!(buffer.len(), 1);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_buffer_evicts_oldest() {
        let mut buffer = ExperienceBuffer::new(3);
        for i in 0..5 {
            buffer.push(create_test_experience(f64::from(i)));
        }
        assert_eq!(buffer.len(), 3);
        let rewards: Vec<f64> = buffer.iter().map(|e| e.reward).collect();
        assert_eq!(rewards, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_sample_without_replacement() {
        let mut buffer = ExperienceBuffer::new(100);
        for i in 0..10 {
            buffer.push(create_test_experience(f64::from(i)));
        }
        let mut rng = StdRng::seed_from_u64(0);
        let sample = buffer.sample(5, &mut rng);
        assert_eq!(sample.len(), 5);
        let mut rewards: Vec<i64> = sample.iter().map(|e| e.reward as i64).collect();
        rewards.sort_unstable();
        rewards.dedup();
        assert_eq!(rewards.len(), 5);
    }

    #[test]
    fn test_sample_larger_than_buffer() {
        let mut buffer = ExperienceBuffer::new(100);
        for i in 0..3 {
            buffer.push(create_test_experience(f64::from(i)));
        }
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(buffer.sample(10, &mut rng).len(), 3);
        buffer.clear();
        assert!(buffer.sample(10, &mut rng).is_empty());
    }
}
