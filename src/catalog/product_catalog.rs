//! Immutable part-number lookup table.

use crate::model::CatalogEntry;
use std::collections::HashMap;

/// Product catalog keyed by part number.
///
/// Built once before any enrichment and never mutated afterwards; stages share
/// it through an `Arc` and read it without locking.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: HashMap<String, CatalogEntry>,
}

impl Catalog {
    /// Build from entries. The last entry for a duplicate part number wins.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = CatalogEntry>,
    {
        let mut map = HashMap::new();
        for entry in entries {
            map.insert(entry.part_number.clone(), entry);
        }
        Self { entries: map }
    }

    /// Look up a part number.
    pub fn get(&self, part_number: &str) -> Option<&CatalogEntry> {
        self.entries.get(part_number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Money;

    fn entry(part: &str, cost: i64, price: i64) -> CatalogEntry {
        CatalogEntry {
            part_number: part.to_string(),
            unit_cost: Money::from_cents(cost),
            unit_price: Money::from_cents(price),
        }
    }

    #[test]
    fn test_lookup() {
        let catalog = Catalog::from_entries(vec![entry("P1", 200, 300), entry("P2", 500, 750)]);

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("P1").unwrap().unit_price, Money::from_cents(300));
        assert!(catalog.get("P2").is_some());
        assert!(catalog.get("P3").is_none());
    }

    #[test]
    fn test_duplicate_key_last_wins() {
        let catalog = Catalog::from_entries(vec![entry("P1", 100, 100), entry("P1", 200, 300)]);

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("P1").unwrap().unit_cost, Money::from_cents(200));
    }

    #[test]
    fn test_empty() {
        let catalog = Catalog::default();
        assert!(catalog.is_empty());
        assert_eq!(catalog.len(), 0);
    }
}
