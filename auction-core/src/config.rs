use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::error::{Result, SimError};
use crate::types::{Price, Ticks};

// === AUCTION ===

/// One tier of the price escalation ladder: prices up to and including
/// `up_to` are multiplied by `multiplier`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Tsify)]
pub struct EscalationTier {
    pub up_to: Price,
    pub multiplier: f64,
    /// Whether `up_to` itself belongs to this tier.
    pub inclusive: bool,
}

/// Auctioneer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[serde(default)]
pub struct AuctionConfig {
    /// Ascending tiers; the first matching tier wins.
    pub tiers: Vec<EscalationTier>,
    /// Multiplier applied above the last tier.
    pub top_multiplier: f64,
    /// Smallest allowed price step, so a zero price still escalates.
    pub min_increment: Price,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                EscalationTier {
                    up_to: 10.0,
                    multiplier: 1.3,
                    inclusive: false,
                },
                EscalationTier {
                    up_to: 100.0,
                    multiplier: 1.2,
                    inclusive: true,
                },
            ],
            top_multiplier: 1.1,
            min_increment: 0.01,
        }
    }
}

impl AuctionConfig {
    /// Multiplier for the tier containing `price`.
    pub fn multiplier_for(&self, price: Price) -> f64 {
        self.tiers
            .iter()
            .find(|tier| {
                if tier.inclusive {
                    price <= tier.up_to
                } else {
                    price < tier.up_to
                }
            })
            .map(|tier| tier.multiplier)
            .unwrap_or(self.top_multiplier)
    }

    /// Next best price after a contested round. Strictly greater than `price`.
    pub fn escalate(&self, price: Price) -> Price {
        (price * self.multiplier_for(price)).max(price + self.min_increment)
    }

    pub fn validate(&self) -> Result<()> {
        let multipliers = self
            .tiers
            .iter()
            .map(|t| t.multiplier)
            .chain(std::iter::once(self.top_multiplier));
        for m in multipliers {
            if !(m > 1.0) {
                return Err(SimError::InvalidConfig(format!(
                    "escalation multiplier must exceed 1.0, got {m}"
                )));
            }
        }
        if self.tiers.windows(2).any(|w| w[0].up_to > w[1].up_to) {
            return Err(SimError::InvalidConfig(
                "escalation tiers must be ascending".to_string(),
            ));
        }
        if !(self.min_increment > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "min_increment must be positive, got {}",
                self.min_increment
            )));
        }
        Ok(())
    }
}

// === EMOTION ===

/// Shape of `f(anxiety, frustration)`, the emotional intensity that scales
/// the active product's weight by `1 + f`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Tsify)]
pub enum EmotionScaling {
    /// `(anxiety + frustration) / (anxiety_cap + frustration_cap)`, in [0, 1].
    #[default]
    NormalizedSum,
    /// `ln(1 + anxiety + frustration)`.
    LogCompressed,
}

/// Affective-agent parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Tsify)]
#[serde(default)]
pub struct EmotionConfig {
    pub anxiety_step: f64,
    pub anxiety_cap: f64,
    /// Frustration is pinned here after any lost auction.
    pub frustration_cap: f64,
    pub scaling: EmotionScaling,
    /// Weight of the emotional penalty applied to utility on a loss.
    pub loss_penalty: f64,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            anxiety_step: 1.0,
            anxiety_cap: 20.0,
            frustration_cap: 10.0,
            scaling: EmotionScaling::NormalizedSum,
            loss_penalty: 0.1,
        }
    }
}

impl EmotionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.anxiety_step < 0.0 || self.anxiety_cap < 0.0 || self.frustration_cap < 0.0 {
            return Err(SimError::InvalidConfig(
                "emotion step and caps must be non-negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.loss_penalty) {
            return Err(SimError::InvalidConfig(format!(
                "loss_penalty must lie in [0, 1], got {}",
                self.loss_penalty
            )));
        }
        Ok(())
    }
}

// === POPULATION ===

/// How the bidder population is drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[serde(default)]
pub struct PopulationConfig {
    pub affective_agents: u32,
    pub rational_agents: u32,
    /// Budgets are drawn uniformly from `[budget_min, budget_max)`.
    pub budget_min: Price,
    pub budget_max: Price,
    /// Raw preference draws come from `[alpha_min, alpha_max)` before normalisation.
    pub alpha_min: f64,
    pub alpha_max: f64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            affective_agents: 1,
            rational_agents: 1,
            budget_min: 600.0,
            budget_max: 700.0,
            alpha_min: 0.1,
            alpha_max: 1.0,
        }
    }
}

impl PopulationConfig {
    pub fn total_agents(&self) -> u32 {
        self.affective_agents + self.rational_agents
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.budget_min >= 0.0 && self.budget_min < self.budget_max) {
            return Err(SimError::InvalidConfig(format!(
                "budget range [{}, {}) is empty or negative",
                self.budget_min, self.budget_max
            )));
        }
        if !(self.alpha_min > 0.0 && self.alpha_min < self.alpha_max) {
            return Err(SimError::InvalidConfig(format!(
                "alpha range [{}, {}) must be positive and non-empty",
                self.alpha_min, self.alpha_max
            )));
        }
        Ok(())
    }
}

// === TIMING ===

/// Activation delays and run guards for the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Tsify)]
#[serde(default)]
pub struct TimingConfig {
    pub auctioneer_delay: Ticks,
    pub agent_delay: Ticks,
    /// Upper bound on coordinator steps before a run is abandoned.
    pub max_steps: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            auctioneer_delay: 1,
            agent_delay: 5,
            max_steps: 100_000,
        }
    }
}

// === CATALOG ===

/// Shape of the generated product catalog a run draws from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Tsify)]
#[serde(default)]
pub struct CatalogConfig {
    /// Number of products in the catalog.
    pub size: u32,
    /// Initial prices are drawn uniformly from `[price_min, price_max)`.
    pub price_min: Price,
    pub price_max: Price,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            size: 40,
            price_min: 5.0,
            price_max: 150.0,
        }
    }
}

impl CatalogConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.price_min > 0.0 && self.price_min < self.price_max) {
            return Err(SimError::InvalidConfig(format!(
                "catalog price range [{}, {}) must be positive and non-empty",
                self.price_min, self.price_max
            )));
        }
        Ok(())
    }
}

// === SIMULATION ===

/// Smallest product set a run may draw: weights are normalised over the
/// selection, so a single product would always carry the whole budget.
pub const MIN_PRODUCTS_PER_RUN: usize = 2;

/// Everything needed to build a seeded run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    /// Number of products drawn from the catalog for this run.
    pub products_per_run: usize,
    pub catalog: CatalogConfig,
    pub auction: AuctionConfig,
    pub emotion: EmotionConfig,
    pub population: PopulationConfig,
    pub timing: TimingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            products_per_run: 10,
            catalog: CatalogConfig::default(),
            auction: AuctionConfig::default(),
            emotion: EmotionConfig::default(),
            population: PopulationConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.catalog.validate()?;
        self.auction.validate()?;
        self.emotion.validate()?;
        self.population.validate()?;
        if self.products_per_run < MIN_PRODUCTS_PER_RUN {
            return Err(SimError::InvalidConfig(format!(
                "products_per_run must be at least {MIN_PRODUCTS_PER_RUN}, got {}",
                self.products_per_run
            )));
        }
        if self.timing.auctioneer_delay == 0 || self.timing.agent_delay == 0 {
            return Err(SimError::InvalidConfig(
                "activation delays must be at least one tick".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_follow_price_bands() {
        let cfg = AuctionConfig::default();
        assert_eq!(cfg.multiplier_for(5.0), 1.3);
        assert_eq!(cfg.multiplier_for(10.0), 1.2);
        assert_eq!(cfg.multiplier_for(100.0), 1.2);
        assert_eq!(cfg.multiplier_for(100.5), 1.1);
    }

    #[test]
    fn escalation_always_moves_price_up() {
        let cfg = AuctionConfig::default();
        assert!((cfg.escalate(10.0) - 12.0).abs() < 1e-9);
        assert!((cfg.escalate(200.0) - 220.0).abs() < 1e-9);
        // Zero would never move under a pure multiplier
        assert!((cfg.escalate(0.0) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_shrinking_multiplier() {
        let mut cfg = SimulationConfig::default();
        cfg.auction.top_multiplier = 0.9;
        assert!(matches!(cfg.validate(), Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_single_product_runs() {
        let mut cfg = SimulationConfig::default();
        cfg.products_per_run = 1;
        assert!(matches!(cfg.validate(), Err(SimError::InvalidConfig(_))));
        cfg.products_per_run = 2;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_budget_range() {
        let mut cfg = SimulationConfig::default();
        cfg.population.budget_min = 800.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: SimulationConfig =
            serde_json::from_str(r#"{"seed": 7, "population": {"rational_agents": 3}}"#).unwrap();
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.population.rational_agents, 3);
        assert_eq!(cfg.population.affective_agents, 1);
        assert_eq!(cfg.emotion.frustration_cap, 10.0);
    }
}
