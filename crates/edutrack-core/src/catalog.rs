//! Item catalog boundary.
//!
//! The catalog is reference data owned elsewhere. The engine only reads it
//! when a transfer is created, to snapshot each line's code, name and unit.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A catalog entry as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    pub code: String,
    pub unit_of_measure: String,
}

impl CatalogItem {
    pub fn new(
        id: impl Into<String>,
        code: impl Into<String>,
        name: impl Into<String>,
        unit_of_measure: impl Into<String>,
    ) -> Self {
        CatalogItem {
            id: id.into(),
            code: code.into(),
            name: name.into(),
            unit_of_measure: unit_of_measure.into(),
        }
    }
}

/// Read-only lookup into the item catalog.
pub trait ItemCatalog: Send + Sync {
    fn lookup(&self, item_id: &str) -> Option<CatalogItem>;
}

/// In-memory catalog, for tests and seeding.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    items: HashMap<String, CatalogItem>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, item: CatalogItem) -> Self {
        self.insert(item);
        self
    }

    pub fn insert(&mut self, item: CatalogItem) {
        self.items.insert(item.id.clone(), item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<CatalogItem> for StaticCatalog {
    fn from_iter<I: IntoIterator<Item = CatalogItem>>(iter: I) -> Self {
        let mut catalog = StaticCatalog::new();
        for item in iter {
            catalog.insert(item);
        }
        catalog
    }
}

impl ItemCatalog for StaticCatalog {
    fn lookup(&self, item_id: &str) -> Option<CatalogItem> {
        self.items.get(item_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_catalog_lookup() {
        let catalog: StaticCatalog = vec![
            CatalogItem::new("item-1", "MATH-G4", "Mathematics Grade 4", "book"),
            CatalogItem::new("item-2", "CHALK-W", "White chalk", "box"),
        ]
        .into_iter()
        .collect();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.lookup("item-2").map(|i| i.code), Some("CHALK-W".to_string()));
        assert!(catalog.lookup("item-9").is_none());
    }
}
