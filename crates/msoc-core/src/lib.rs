//! MicroSociety Core - grid world simulation for NPC reinforcement learning
//!
//! This crate provides the world the agents live in: the tile map, NPCs,
//! houses, the market, the action rules with their reward shaping, and
//! the `Environment` implementations consumed by `msoc-rl`.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::float_cmp)]

pub mod action;
pub mod config;
pub mod env;
pub mod error;
pub mod house;
pub mod inventory;
pub mod ledger;
pub mod map;
pub mod market;
pub mod npc;
pub mod state;
pub mod time;
pub mod transition;
pub mod types;
pub mod world;

pub use action::ActionType;
pub use config::{SimulationConfig, WorldConfig};
pub use env::{Environment, Transition};
pub use error::{Result, SocietyError};
pub use house::House;
pub use inventory::Inventory;
pub use ledger::MoneyLedger;
pub use map::{ObjectKind, Terrain, Tile, TileMap};
pub use market::Market;
pub use npc::{Npc, NpcId};
pub use state::{State, STATE_SIZE};
pub use time::TimeManager;
pub use transition::ActionOutcome;
pub use types::{Direction, Position, Resource};
pub use world::World;
