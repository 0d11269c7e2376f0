//! Reserve price allocation.
//!
//! The budget is split across the products an agent has not yet seen
//! settled, in proportion to their (effective) weights. Settled products
//! drop out of the pool and get 0, so for the remaining products
//! `Σ reserve ≤ budget` always holds.

use std::collections::{BTreeMap, BTreeSet};

use crate::preferences::PreferenceWeights;
use crate::types::{Price, ProductId};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReservePriceTable {
    prices: BTreeMap<ProductId, Price>,
}

impl ReservePriceTable {
    /// Reserve price for a product; unknown products get 0.
    pub fn get(&self, product: ProductId) -> Price {
        self.prices.get(&product).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProductId, Price)> + '_ {
        self.prices.iter().map(|(id, p)| (*id, *p))
    }

    pub fn total(&self) -> Price {
        self.prices.values().sum()
    }
}

/// Inputs for one allocation.
#[derive(Debug, Clone, Copy)]
pub struct Allocation<'a> {
    pub weights: &'a PreferenceWeights,
    pub settled: &'a BTreeSet<ProductId>,
    pub budget: Price,
    /// Product being auctioned; its weight is scaled by `1 + emotion`.
    pub active: ProductId,
    /// Emotional intensity, `None` for agents without emotions.
    pub emotion: Option<f64>,
}

pub fn allocate(alloc: Allocation<'_>) -> ReservePriceTable {
    let effective: Vec<(ProductId, f64)> = alloc
        .weights
        .iter()
        .filter(|(id, _)| !alloc.settled.contains(id))
        .map(|(id, w)| {
            let scale = match alloc.emotion {
                Some(f) if id == alloc.active => 1.0 + f.max(0.0),
                _ => 1.0,
            };
            (id, w * scale)
        })
        .collect();
    let pool: f64 = effective.iter().map(|(_, w)| w).sum();
    let budget = alloc.budget.max(0.0);

    let mut prices: BTreeMap<ProductId, Price> =
        alloc.weights.products().map(|id| (id, 0.0)).collect();
    if pool > 0.0 {
        for (id, w) in effective {
            prices.insert(id, w / pool * budget);
        }
    }

    ReservePriceTable { prices }
}
