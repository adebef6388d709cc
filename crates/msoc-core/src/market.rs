//! Central market with demand/supply driven pricing
//!
//! Buying raises demand and drains supply, selling does the reverse. Prices
//! are recomputed after every trade and drift on their own every
//! [`DYNAMICS_INTERVAL`] seconds.

use std::collections::{BTreeMap, VecDeque};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::ledger::MoneyLedger;
use crate::npc::Npc;

pub const ESSENTIAL_ITEMS: [&str; 3] = ["wood", "stone", "bush"];
pub const MIN_PRICE: f32 = 1.0;
pub const MAX_PRICE: f32 = 500.0;
pub const INITIAL_DEMAND: i32 = 50;
pub const INITIAL_SUPPLY: i32 = 100;
pub const DYNAMICS_INTERVAL: f32 = 2.0;
pub const HISTORY_LEN: usize = 10;
/// Listing price for items first seen in a trade
pub const DEFAULT_PRICE: f32 = 25.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMarket {
    pub price: f32,
    pub demand: i32,
    pub supply: i32,
    pub bought: u32,
    pub sold: u32,
    pub revenue: f32,
    pub expenditure: f32,
    pub history: VecDeque<f32>,
}

impl ItemMarket {
    fn new(price: f32) -> Self {
        Self {
            price,
            demand: INITIAL_DEMAND,
            supply: INITIAL_SUPPLY,
            bought: 0,
            sold: 0,
            revenue: 0.0,
            expenditure: 0.0,
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    fn track(&mut self) {
        self.history.push_back(self.price);
        while self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    items: BTreeMap<String, ItemMarket>,
    pub buy_margin: f32,
    pub sell_margin: f32,
    pub price_adjustment_factor: f32,
    accumulator: f32,
}

impl Default for Market {
    fn default() -> Self {
        Self::empty()
    }
}

fn round_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

fn random_price<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    rng.gen_range(1..=50) as f32
}

/// Price after a purchase. Scarce supply pushes the price up.
pub fn adjust_on_buy(price: f32, demand: i32, supply: i32, factor: f32) -> f32 {
    let supply = supply.max(1) as f32;
    let change = factor * (demand as f32 / (supply + 10.0));
    (price * (1.0 + change - 0.05)).clamp(MIN_PRICE, MAX_PRICE)
}

/// Price after a sale. Plentiful supply pushes the price down.
pub fn adjust_on_sell(price: f32, demand: i32, supply: i32, factor: f32) -> f32 {
    let demand = demand.max(1) as f32;
    let change = -factor * (supply as f32 / (demand + 10.0));
    (price * (1.0 + change + 0.05)).clamp(MIN_PRICE, MAX_PRICE)
}

impl Market {
    pub fn empty() -> Self {
        Self {
            items: BTreeMap::new(),
            buy_margin: 1.1,
            sell_margin: 0.9,
            price_adjustment_factor: 0.05,
            accumulator: 0.0,
        }
    }

    /// Market listing the essential items at random prices in [1, 50]
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut market = Self::empty();
        for item in ESSENTIAL_ITEMS {
            market.set_price(item, random_price(rng));
        }
        market
    }

    /// List `item` at `price`. Already listed items keep their state.
    pub fn set_price(&mut self, item: &str, price: f32) {
        self.items
            .entry(item.to_string())
            .or_insert_with(|| ItemMarket::new(price));
    }

    pub fn item(&self, item: &str) -> Option<&ItemMarket> {
        self.items.get(item)
    }

    pub fn items(&self) -> impl Iterator<Item = (&str, &ItemMarket)> {
        self.items.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn price(&self, item: &str) -> f32 {
        self.items.get(item).map_or(0.0, |entry| round_tenth(entry.price))
    }

    pub fn buy_price(&self, item: &str) -> f32 {
        self.items
            .get(item)
            .map_or(0.0, |entry| round_tenth(entry.price * self.buy_margin))
    }

    pub fn sell_price(&self, item: &str) -> f32 {
        self.items
            .get(item)
            .map_or(0.0, |entry| round_tenth(entry.price * self.sell_margin))
    }

    pub fn buy(&mut self, npc: &mut Npc, item: &str, qty: u32, ledger: &mut MoneyLedger) -> bool {
        if qty == 0 || item.is_empty() {
            return false;
        }
        self.set_price(item, DEFAULT_PRICE);
        let cost = self.buy_price(item) * qty as f32;
        if npc.money < cost {
            debug!(npc = %npc.name, item, cost, "cannot afford purchase");
            return false;
        }
        if !npc.inventory.add(item, qty) {
            debug!(npc = %npc.name, item, "inventory full, purchase refused");
            return false;
        }
        npc.money -= cost;
        ledger.record_spent(cost);

        let factor = self.price_adjustment_factor;
        if let Some(entry) = self.items.get_mut(item) {
            let q = qty as i32;
            entry.demand += q;
            entry.supply = (entry.supply - q).max(0);
            entry.price = adjust_on_buy(entry.price, entry.demand, entry.supply, factor);
            entry.bought += qty;
            entry.expenditure += cost;
        }
        npc.add_reward(5.0 * qty as f32);
        debug!(npc = %npc.name, item, qty, cost, "market buy");
        true
    }

    pub fn sell(&mut self, npc: &mut Npc, item: &str, qty: u32, ledger: &mut MoneyLedger) -> bool {
        if qty == 0 || item.is_empty() {
            return false;
        }
        self.set_price(item, DEFAULT_PRICE);
        if npc.inventory.count(item) < qty || !npc.inventory.remove(item, qty) {
            debug!(npc = %npc.name, item, qty, "not enough stock to sell");
            return false;
        }
        let revenue = self.sell_price(item) * qty as f32;
        npc.money += revenue;
        ledger.record_earned(revenue);

        let factor = self.price_adjustment_factor;
        if let Some(entry) = self.items.get_mut(item) {
            let q = qty as i32;
            entry.supply += q;
            entry.demand = (entry.demand - q).max(0);
            entry.price = adjust_on_sell(entry.price, entry.demand, entry.supply, factor);
            entry.sold += qty;
            entry.revenue += revenue;
        }
        npc.add_reward(10.0 * qty as f32);
        debug!(npc = %npc.name, item, qty, revenue, "market sell");
        true
    }

    /// Random walk of demand and supply, applied once per interval
    pub fn simulate_dynamics<R: Rng + ?Sized>(&mut self, dt: f32, rng: &mut R) {
        self.accumulator += dt;
        if self.accumulator < DYNAMICS_INTERVAL {
            return;
        }
        self.accumulator = 0.0;

        for (name, entry) in &mut self.items {
            let old_demand = entry.demand;
            let old_supply = entry.supply;
            entry.demand = (entry.demand + rng.gen_range(-1..=1)).max(10);
            entry.supply = (entry.supply + rng.gen_range(-1..=1)).max(10);

            let demand_factor = 1.0 + (entry.demand - old_demand) as f32 / 500.0;
            let supply_factor = 1.0 - (entry.supply - old_supply) as f32 / 500.0;
            entry.price = (entry.price * demand_factor * supply_factor).clamp(MIN_PRICE, MAX_PRICE);
            entry.track();
            trace!(item = %name, price = entry.price, "market drift");
        }
    }

    /// Pull prices towards their demand/supply equilibrium
    pub fn stabilize_prices(&mut self, dt: f32) {
        for entry in self.items.values_mut() {
            let ratio = entry.demand as f32 / (entry.supply + 1) as f32;
            let target = 10.0 * (1.0 + (ratio - 1.0) * 0.05);
            entry.price += (target - entry.price) * dt * 0.1;
            entry.track();
        }
    }

    /// Population standard deviation of the recent price history
    pub fn volatility(&self, item: &str) -> f32 {
        let Some(entry) = self.items.get(item) else {
            return 0.0;
        };
        let n = entry.history.len();
        if n < 2 {
            return 0.0;
        }
        let mean = entry.history.iter().sum::<f32>() / n as f32;
        let variance = entry
            .history
            .iter()
            .map(|p| (p - mean).powi(2))
            .sum::<f32>()
            / n as f32;
        variance.sqrt()
    }

    pub fn suggest_best_to_buy(&self) -> &'static str {
        ESSENTIAL_ITEMS
            .iter()
            .filter(|item| self.items.get(**item).is_some_and(|e| e.demand > 5))
            .min_by(|a, b| self.buy_price(a).total_cmp(&self.buy_price(b)))
            .copied()
            .unwrap_or("wood")
    }

    pub fn suggest_best_to_sell(&self) -> Option<&'static str> {
        let mut best: Option<(&'static str, f32)> = None;
        for item in ESSENTIAL_ITEMS {
            if !self.items.get(item).is_some_and(|e| e.supply > 0) {
                continue;
            }
            let price = self.sell_price(item);
            if price > best.map_or(0.0, |(_, p)| p) {
                best = Some((item, price));
            }
        }
        best.map(|(item, _)| item)
    }

    pub fn total_items_bought(&self) -> u32 {
        self.items.values().map(|e| e.bought).sum()
    }

    pub fn total_items_sold(&self) -> u32 {
        self.items.values().map(|e| e.sold).sum()
    }

    pub fn reset_transactions(&mut self) {
        for entry in self.items.values_mut() {
            entry.bought = 0;
            entry.sold = 0;
            entry.revenue = 0.0;
            entry.expenditure = 0.0;
        }
    }

    pub fn randomize_prices<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for entry in self.items.values_mut() {
            entry.price = random_price(rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::config::WorldConfig;
    use crate::types::Position;

    fn create_test_market() -> Market {
        let mut market = Market::empty();
        market.set_price("wood", 10.0);
        market.set_price("stone", 20.0);
        market.set_price("bush", 5.0);
        market
    }

    fn create_test_npc() -> Npc {
        Npc::new("Trader", Position::new(0, 0), &WorldConfig::default())
    }

    #[test]
    fn test_set_price_only_initialises() {
        let mut market = create_test_market();
        market.set_price("wood", 99.0);
        assert_eq!(market.price("wood"), 10.0);
        assert_eq!(market.buy_price("wood"), 11.0);
        assert_eq!(market.sell_price("wood"), 9.0);
        assert_eq!(market.price("gold"), 0.0);
    }

    #[test]
    fn test_adjust_formulas() {
        // 0.05 * 50 / 110 - 0.05 is negative, so the price dips
        let after_buy = adjust_on_buy(10.0, 50, 100, 0.05);
        assert!((after_buy - 10.0 * (1.0 + 0.05 * 50.0 / 110.0 - 0.05)).abs() < 1e-5);
        assert_eq!(adjust_on_buy(600.0, 1000, 0, 0.05), MAX_PRICE);
        assert_eq!(adjust_on_sell(1.0, 0, 10_000, 0.05), MIN_PRICE);
    }

    #[test]
    fn test_buy_updates_everything() {
        let mut market = create_test_market();
        let mut npc = create_test_npc();
        let mut ledger = MoneyLedger::new();

        assert!(market.buy(&mut npc, "wood", 2, &mut ledger));
        assert_eq!(npc.money, 78.0);
        assert_eq!(npc.inventory.count("wood"), 2);
        assert_eq!(npc.reward_balance(), 10.0);
        assert_eq!(ledger.spent(), 22.0);

        let wood = market.item("wood").unwrap();
        assert_eq!(wood.demand, 52);
        assert_eq!(wood.supply, 98);
        assert_eq!(wood.bought, 2);
        assert_eq!(market.total_items_bought(), 2);
    }

    #[test]
    fn test_buy_rejections() {
        let mut market = create_test_market();
        let mut npc = create_test_npc();
        let mut ledger = MoneyLedger::new();

        assert!(!market.buy(&mut npc, "wood", 0, &mut ledger));
        npc.money = 1.0;
        assert!(!market.buy(&mut npc, "stone", 1, &mut ledger));
        npc.money = 1000.0;
        npc.inventory.add("bush", 10);
        assert!(!market.buy(&mut npc, "wood", 1, &mut ledger));
        assert_eq!(npc.money, 1000.0);
        assert_eq!(ledger.spent(), 0.0);
    }

    #[test]
    fn test_sell_flow() {
        let mut market = create_test_market();
        let mut npc = create_test_npc();
        let mut ledger = MoneyLedger::new();

        assert!(!market.sell(&mut npc, "stone", 1, &mut ledger));
        npc.inventory.add("stone", 1);
        assert!(market.sell(&mut npc, "stone", 1, &mut ledger));
        assert_eq!(npc.money, 118.0);
        assert_eq!(npc.reward_balance(), 10.0);
        assert_eq!(ledger.earned(), 18.0);
        let stone = market.item("stone").unwrap();
        assert_eq!(stone.supply, 101);
        assert_eq!(stone.demand, 49);
        assert_eq!(market.total_items_sold(), 1);

        market.reset_transactions();
        assert_eq!(market.total_items_sold(), 0);
    }

    #[test]
    fn test_dynamics_wait_for_interval() {
        let mut market = create_test_market();
        let mut rng = StdRng::seed_from_u64(3);
        market.simulate_dynamics(1.0, &mut rng);
        assert!(market.item("wood").unwrap().history.is_empty());
        market.simulate_dynamics(1.0, &mut rng);
        assert_eq!(market.item("wood").unwrap().history.len(), 1);

        for _ in 0..30 {
            market.simulate_dynamics(DYNAMICS_INTERVAL, &mut rng);
        }
        let wood = market.item("wood").unwrap();
        assert_eq!(wood.history.len(), HISTORY_LEN);
        assert!(wood.demand >= 10 && wood.supply >= 10);
        assert!((MIN_PRICE..=MAX_PRICE).contains(&wood.price));
    }

    #[test]
    fn test_volatility() {
        let mut market = create_test_market();
        assert_eq!(market.volatility("wood"), 0.0);
        market.stabilize_prices(1.0);
        assert_eq!(market.volatility("wood"), 0.0);
        market.stabilize_prices(1.0);
        assert!(market.volatility("wood") > 0.0);
        assert_eq!(market.volatility("gold"), 0.0);
    }

    #[test]
    fn test_suggestions() {
        let market = create_test_market();
        assert_eq!(market.suggest_best_to_buy(), "bush");
        assert_eq!(market.suggest_best_to_sell(), Some("stone"));
        assert_eq!(Market::empty().suggest_best_to_buy(), "wood");
        assert_eq!(Market::empty().suggest_best_to_sell(), None);
    }

    #[test]
    fn test_new_prices_in_range() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut market = Market::new(&mut rng);
        for item in ESSENTIAL_ITEMS {
            assert!((1.0..=50.0).contains(&market.price(item)));
        }
        market.randomize_prices(&mut rng);
        assert_eq!(market.items().count(), 3);
    }
}
