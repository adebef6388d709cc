//! Running totals of money flowing through the market

use serde::{Deserialize, Serialize};

use crate::npc::Npc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MoneyLedger {
    earned: f64,
    spent: f64,
}

impl MoneyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_earned(&mut self, amount: f32) {
        self.earned += f64::from(amount);
    }

    pub fn record_spent(&mut self, amount: f32) {
        self.spent += f64::from(amount);
    }

    pub fn earned(&self) -> f64 {
        self.earned
    }

    pub fn spent(&self) -> f64 {
        self.spent
    }

    pub fn net(&self) -> f64 {
        self.earned - self.spent
    }

    /// Money currently held across `npcs`
    pub fn total_money(npcs: &[Npc]) -> f64 {
        npcs.iter().map(|npc| f64::from(npc.money)).sum()
    }
}
