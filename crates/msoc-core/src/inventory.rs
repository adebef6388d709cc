//! Bounded item inventory carried by NPCs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CAPACITY: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    items: BTreeMap<String, u32>,
    capacity: u32,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl Inventory {
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            items: BTreeMap::new(),
            capacity,
        }
    }

    /// Add `qty` of `item`. Leaves the inventory untouched when it would overflow.
    pub fn add(&mut self, item: &str, qty: u32) -> bool {
        if !self.has_space(qty) {
            return false;
        }
        *self.items.entry(item.to_string()).or_insert(0) += qty;
        true
    }

    /// Remove `qty` of `item`. Fails without change if there is not enough.
    pub fn remove(&mut self, item: &str, qty: u32) -> bool {
        match self.items.get_mut(item) {
            Some(have) if *have >= qty => {
                *have -= qty;
                if *have == 0 {
                    self.items.remove(item);
                }
                true
            }
            _ => false,
        }
    }

    pub fn count(&self, item: &str) -> u32 {
        self.items.get(item).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.items.values().sum()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.total() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn has_space(&self, qty: u32) -> bool {
        self.total()
            .checked_add(qty)
            .is_some_and(|total| total <= self.capacity)
    }

    pub fn upgrade_capacity(&mut self, extra: u32) {
        self.capacity += extra;
    }

    /// First held item in name order
    pub fn first_item(&self) -> Option<&str> {
        self.items
            .iter()
            .find(|(_, qty)| **qty > 0)
            .map(|(name, _)| name.as_str())
    }

    pub fn items(&self) -> impl Iterator<Item = (&str, u32)> {
        self.items.iter().map(|(name, qty)| (name.as_str(), *qty))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_respects_capacity() {
        let mut inv = Inventory::with_capacity(3);
        assert!(inv.add("wood", 2));
        assert!(!inv.add("stone", 2));
        assert_eq!(inv.total(), 2);
        assert_eq!(inv.count("stone"), 0);
        assert!(inv.add("stone", 1));
        assert!(inv.is_full());
    }

    #[test]
    fn test_remove_erases_empty_entries() {
        let mut inv = Inventory::default();
        inv.add("wood", 2);
        assert!(!inv.remove("wood", 3));
        assert_eq!(inv.count("wood"), 2);
        assert!(inv.remove("wood", 2));
        assert!(inv.is_empty());
        assert_eq!(inv.first_item(), None);
        assert!(!inv.remove("bush", 1));
    }

    #[test]
    fn test_first_item_is_ordered() {
        let mut inv = Inventory::default();
        inv.add("wood", 1);
        inv.add("bush", 1);
        assert_eq!(inv.first_item(), Some("bush"));
    }

    #[test]
    fn test_upgrade_capacity() {
        let mut inv = Inventory::with_capacity(1);
        inv.add("wood", 1);
        assert!(!inv.has_space(1));
        inv.upgrade_capacity(5);
        assert!(inv.has_space(5));
        assert_eq!(inv.capacity(), 6);
    }

    #[test]
    fn test_huge_quantity_never_fits() {
        let mut inv = Inventory::with_capacity(10);
        inv.add("wood", 2);
        assert!(!inv.has_space(u32::MAX));
        assert!(!inv.add("stone", u32::MAX - 1));
        assert_eq!(inv.total(), 2);
    }
}
