//! Per-agent preference weights ("alphas") and the utility curve built on them.
//!
//! Weights are drawn once when an agent is created and never change. They
//! drive two things:
//! - the share of the budget each product gets as a reserve price
//! - the utility gained from a purchase, `2^weight`
//!
//! The best an agent can do is win everything in its product set, so the
//! maximum achievable utility is `Π 2^w = 2^Σw`.

use std::collections::BTreeMap;

use rand::Rng;

use crate::types::{ProductId, Weight};

/// Base of the utility growth term: a win multiplies utility by `(1 + 1)^w`.
pub const WIN_GROWTH_BASE: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreferenceWeights {
    weights: BTreeMap<ProductId, Weight>,
}

impl PreferenceWeights {
    /// Draw one weight per product from `[alpha_min, alpha_max)` and
    /// normalise so they sum to 1. Each weight lies in (0, 1) only when there
    /// are at least two products; a lone product normalises to exactly 1.
    pub fn generate<R: Rng>(
        rng: &mut R,
        products: &[ProductId],
        alpha_min: f64,
        alpha_max: f64,
    ) -> Self {
        let raw: Vec<(ProductId, f64)> = products
            .iter()
            .map(|&id| (id, rng.random_range(alpha_min..alpha_max)))
            .collect();
        Self::normalized(raw)
    }

    /// Build from explicit weights, normalising them to sum to 1.
    pub fn normalized(raw: impl IntoIterator<Item = (ProductId, f64)>) -> Self {
        let raw: Vec<(ProductId, f64)> = raw.into_iter().filter(|(_, w)| *w > 0.0).collect();
        let sum: f64 = raw.iter().map(|(_, w)| w).sum();
        if sum <= 0.0 {
            return Self::default();
        }
        Self {
            weights: raw.into_iter().map(|(id, w)| (id, w / sum)).collect(),
        }
    }

    /// Build from weights used as-is.
    pub fn from_weights(weights: impl IntoIterator<Item = (ProductId, Weight)>) -> Self {
        Self {
            weights: weights.into_iter().collect(),
        }
    }

    /// Weight for a product; unknown products weigh nothing.
    pub fn get(&self, product: ProductId) -> Weight {
        self.weights.get(&product).copied().unwrap_or(0.0)
    }

    pub fn products(&self) -> impl Iterator<Item = ProductId> + '_ {
        self.weights.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProductId, Weight)> + '_ {
        self.weights.iter().map(|(id, w)| (*id, *w))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn total(&self) -> Weight {
        self.weights.values().sum()
    }

    /// Utility reached by winning every product in the set.
    pub fn max_achievable_utility(&self) -> f64 {
        self.weights
            .values()
            .map(|&w| win_growth(w))
            .product()
    }
}

/// Multiplicative utility growth from winning a product of weight `w`.
pub fn win_growth(weight: Weight) -> f64 {
    WIN_GROWTH_BASE.powf(weight)
}

/// Map raw utility onto [0, 1] against the achievable maximum. Raw utility
/// starts at 1, so 1 maps to 0 and `max` maps to 1.
pub fn scale_utility(raw: f64, max: f64) -> f64 {
    if max <= 1.0 {
        return 0.0;
    }
    ((raw - 1.0) / (max - 1.0)).clamp(0.0, 1.0)
}
