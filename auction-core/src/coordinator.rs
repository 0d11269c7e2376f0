//! Discrete-event coordinator for one auctioneer and a population of bidders.
//!
//! Each step:
//! 1. Advance the clock to the earliest scheduled activation
//! 2. Collect outputs from every imminent component
//! 3. Route auctioneer broadcasts to every bidder, bids to the auctioneer
//! 4. Apply transitions (internal first, then external, for confluent events)
//!
//! Components are rescheduled from their `time_advance()` after any transition.

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::agents::{AgentKind, BidderAgent, BiddingPolicy};
use crate::auctioneer::Auctioneer;
use crate::catalog::{ProductCatalog, ProductSelection};
use crate::config::{MIN_PRODUCTS_PER_RUN, SimulationConfig};
use crate::emotion::EmotionState;
use crate::error::{Result, SimError};
use crate::preferences::PreferenceWeights;
use crate::types::{
    AgentInput, AuctioneerInput, AuctioneerOutput, BidOffer, BidderId, FinalResult, Price,
    Product, ProductId, Ticks, TimeAdvance,
};

// === REPORT ===

/// End-of-run state of one bidder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
pub struct AgentSummary {
    pub id: BidderId,
    pub kind: AgentKind,
    pub initial_budget: Price,
    pub total_budget: Price,
    pub money_spent: Price,
    pub products_won: Vec<ProductId>,
    pub raw_utility: f64,
    pub scaled_utility: f64,
    pub emotion: Option<EmotionState>,
}

impl AgentSummary {
    fn of(agent: &BidderAgent) -> Self {
        let budget = agent.budget();
        let utility = agent.utility();
        Self {
            id: agent.id(),
            kind: agent.kind(),
            initial_budget: budget.total_budget + budget.money_spent,
            total_budget: budget.total_budget,
            money_spent: budget.money_spent,
            products_won: budget.purchased.iter().map(|r| r.product_id).collect(),
            raw_utility: utility.raw,
            scaled_utility: utility.scaled,
            emotion: agent.emotion(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct SimulationReport {
    pub seed: u64,
    /// One entry per auctioned product, in auction order.
    pub final_results: Vec<FinalResult>,
    /// Number of escalated rounds across all products.
    pub round_results: u64,
    pub elapsed: Ticks,
    pub steps: u64,
    pub agents: Vec<AgentSummary>,
}

impl SimulationReport {
    pub fn sold_count(&self) -> usize {
        self.final_results.iter().filter(|r| r.is_sold()).count()
    }

    pub fn result_for(&self, product: ProductId) -> Option<&FinalResult> {
        self.final_results.iter().find(|r| r.product_id == product)
    }

    pub fn agent(&self, id: BidderId) -> Option<&AgentSummary> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Total paid by all bidders.
    pub fn revenue(&self) -> Price {
        self.final_results
            .iter()
            .filter(|r| r.is_sold())
            .map(|r| r.best_price)
            .sum()
    }
}

// === COORDINATOR ===

pub struct Coordinator {
    seed: u64,
    auctioneer: Auctioneer,
    agents: Vec<BidderAgent>,
    now: Ticks,
    auctioneer_next: Option<Ticks>,
    agent_next: Vec<Option<Ticks>>,
    /// Every auctioneer broadcast, in emission order.
    broadcasts: Vec<AuctioneerOutput>,
    steps: u64,
    max_steps: u64,
}

impl Coordinator {
    /// Wire up prebuilt components and hand the products to the auctioneer at time 0.
    pub fn new(
        mut auctioneer: Auctioneer,
        agents: Vec<BidderAgent>,
        products: Vec<Product>,
        max_steps: u64,
    ) -> Self {
        auctioneer.external_transition(vec![AuctioneerInput::Products(products)]);
        let auctioneer_next = schedule(0, auctioneer.time_advance());
        let agent_next = agents.iter().map(|a| schedule(0, a.time_advance())).collect();
        Self {
            seed: 0,
            auctioneer,
            agents,
            now: 0,
            auctioneer_next,
            agent_next,
            broadcasts: Vec::new(),
            steps: 0,
            max_steps,
        }
    }

    /// Build a seeded run: generate the catalog, draw the product selection,
    /// then create every bidder with its budget and preference weights.
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let catalog = ProductCatalog::generate(&config.catalog, &mut rng);
        Self::build(config, &catalog, &mut rng)
    }

    /// Like `from_config`, drawing from a caller-supplied catalog.
    pub fn with_catalog(config: &SimulationConfig, catalog: &ProductCatalog) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        Self::build(config, catalog, &mut rng)
    }

    fn build(
        config: &SimulationConfig,
        catalog: &ProductCatalog,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let selection = catalog.select(config.products_per_run, rng);
        if selection.len() < MIN_PRODUCTS_PER_RUN {
            return Err(SimError::InvalidCatalog(format!(
                "catalog holds {} products, a run needs at least {MIN_PRODUCTS_PER_RUN}",
                selection.len()
            )));
        }
        let agents = spawn_agents(config, &selection, rng);

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "setup",
            seed = config.seed,
            products = selection.len() as u64,
            affective_agents = config.population.affective_agents,
            rational_agents = config.population.rational_agents,
        );

        let auctioneer = Auctioneer::new(config.auction.clone(), agents.iter().map(|a| a.id()))
            .with_delay(config.timing.auctioneer_delay);
        let mut coordinator = Self::new(
            auctioneer,
            agents,
            selection.into_products(),
            config.timing.max_steps,
        );
        coordinator.seed = config.seed;
        Ok(coordinator)
    }

    pub fn now(&self) -> Ticks {
        self.now
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn auctioneer(&self) -> &Auctioneer {
        &self.auctioneer
    }

    pub fn agents(&self) -> &[BidderAgent] {
        &self.agents
    }

    pub fn agent(&self, id: BidderId) -> Option<&BidderAgent> {
        self.agents.iter().find(|a| a.id() == id)
    }

    pub fn broadcasts(&self) -> &[AuctioneerOutput] {
        &self.broadcasts
    }

    pub fn is_quiescent(&self) -> bool {
        self.next_time().is_none()
    }

    fn next_time(&self) -> Option<Ticks> {
        self.agent_next
            .iter()
            .flatten()
            .chain(self.auctioneer_next.iter())
            .copied()
            .min()
    }

    /// Run one activation. Returns `false` once every component is passive.
    pub fn step(&mut self) -> Result<bool> {
        let Some(now) = self.next_time() else {
            return Ok(false);
        };
        if self.steps >= self.max_steps {
            return Err(SimError::StepLimitExceeded(self.steps));
        }
        self.now = now;
        self.steps += 1;

        // Outputs of imminent components
        let auctioneer_imminent = self.auctioneer_next == Some(now);
        let broadcast: Vec<AuctioneerOutput> = if auctioneer_imminent {
            self.auctioneer.output()
        } else {
            Vec::new()
        };
        let imminent: Vec<usize> = (0..self.agents.len())
            .filter(|&i| self.agent_next[i] == Some(now))
            .collect();
        let bids: Vec<BidOffer> = imminent
            .iter()
            .flat_map(|&i| self.agents[i].output())
            .collect();

        // Auctioneer: internal first, then external
        if auctioneer_imminent {
            self.auctioneer.internal_transition();
        }
        let bids_arrived = !bids.is_empty();
        if bids_arrived {
            self.auctioneer
                .external_transition(vec![AuctioneerInput::Bids(bids)]);
        }
        if auctioneer_imminent || bids_arrived {
            self.auctioneer_next = schedule(now, self.auctioneer.time_advance());
        }

        // Agents
        let inputs: Vec<AgentInput> = broadcast
            .iter()
            .map(|out| out.to_agent_input())
            .collect();
        for (i, agent) in self.agents.iter_mut().enumerate() {
            let was_imminent = self.agent_next[i] == Some(now);
            if was_imminent {
                agent.internal_transition();
            }
            if !inputs.is_empty() {
                agent.external_transition(inputs.clone());
            }
            if was_imminent || !inputs.is_empty() {
                self.agent_next[i] = schedule(now, agent.time_advance());
            }
        }

        self.broadcasts.extend(broadcast);
        Ok(true)
    }

    /// Run until every component is passive.
    ///
    /// Fails with `Stalled` if a round is still waiting for bids at that
    /// point, or `StepLimitExceeded` if the run does not settle in time.
    pub fn run(&mut self) -> Result<SimulationReport> {
        while self.step()? {}

        if let Some(waiting) = self.auctioneer.awaiting_bids() {
            return Err(SimError::Stalled {
                product_id: waiting.product_id,
                round: waiting.round,
                missing: waiting.missing,
            });
        }

        let report = self.report();

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "summary",
            seed = report.seed,
            products = report.final_results.len() as u64,
            sold = report.sold_count() as u64,
            revenue = report.revenue(),
            round_results = report.round_results,
            elapsed = report.elapsed,
            steps = report.steps,
        );

        Ok(report)
    }

    /// Snapshot of the run so far.
    pub fn report(&self) -> SimulationReport {
        SimulationReport {
            seed: self.seed,
            final_results: self.auctioneer.results().to_vec(),
            round_results: self
                .broadcasts
                .iter()
                .filter(|b| matches!(b, AuctioneerOutput::Round(_)))
                .count() as u64,
            elapsed: self.now,
            steps: self.steps,
            agents: self.agents.iter().map(AgentSummary::of).collect(),
        }
    }
}

fn schedule(now: Ticks, ta: TimeAdvance) -> Option<Ticks> {
    match ta {
        TimeAdvance::Passive => None,
        TimeAdvance::After(delay) => Some(now + delay),
    }
}

/// Affective bidders take ids `1..=affective`, rational bidders follow.
fn spawn_agents(
    config: &SimulationConfig,
    selection: &ProductSelection,
    rng: &mut StdRng,
) -> Vec<BidderAgent> {
    let pop = &config.population;
    let ids = selection.ids();
    let policies = std::iter::repeat_n(
        BiddingPolicy::affective(config.emotion),
        pop.affective_agents as usize,
    )
    .chain(std::iter::repeat_n(
        BiddingPolicy::rational(),
        pop.rational_agents as usize,
    ));

    policies
        .enumerate()
        .map(|(i, policy)| {
            let budget = rng.random_range(pop.budget_min..pop.budget_max);
            let weights = PreferenceWeights::generate(rng, &ids, pop.alpha_min, pop.alpha_max);
            BidderAgent::new(BidderId(i as u32 + 1), policy, weights, budget)
                .with_delay(config.timing.agent_delay)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuctionConfig;

    fn single_product_run(agents: Vec<BidderAgent>, price: Price) -> Coordinator {
        let auctioneer = Auctioneer::new(AuctionConfig::default(), agents.iter().map(|a| a.id()));
        Coordinator::new(
            auctioneer,
            agents,
            vec![Product::new(ProductId(1), price)],
            1_000,
        )
    }

    #[test]
    fn default_config_runs_to_completion() {
        let config = SimulationConfig::default().with_seed(42);
        let mut coordinator = Coordinator::from_config(&config).unwrap();
        let report = coordinator.run().unwrap();

        assert_eq!(report.final_results.len(), config.products_per_run);
        assert_eq!(report.agents.len(), 2);
        assert!(coordinator.is_quiescent());
        assert!(coordinator.auctioneer().is_done());
    }

    #[test]
    fn same_seed_same_report() {
        let config = SimulationConfig::default().with_seed(9);
        let a = Coordinator::from_config(&config).unwrap().run().unwrap();
        let b = Coordinator::from_config(&config).unwrap().run().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn agent_ids_put_affective_first() {
        let mut config = SimulationConfig::default();
        config.population.affective_agents = 2;
        config.population.rational_agents = 1;
        let coordinator = Coordinator::from_config(&config).unwrap();
        let kinds: Vec<AgentKind> = coordinator.agents().iter().map(|a| a.kind()).collect();
        assert_eq!(
            kinds,
            vec![AgentKind::Affective, AgentKind::Affective, AgentKind::Rational]
        );
        assert_eq!(coordinator.agents()[2].id(), BidderId(3));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = SimulationConfig::default();
        config.timing.agent_delay = 0;
        assert!(matches!(
            Coordinator::from_config(&config),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn single_product_catalog_is_rejected() {
        let catalog = ProductCatalog::new(vec![Product::new(ProductId(1), 10.0)]);
        assert!(matches!(
            Coordinator::with_catalog(&SimulationConfig::default(), &catalog),
            Err(SimError::InvalidCatalog(_))
        ));
    }

    #[test]
    fn step_limit_aborts_run() {
        let mut config = SimulationConfig::default();
        config.timing.max_steps = 3;
        let mut coordinator = Coordinator::from_config(&config).unwrap();
        assert!(matches!(
            coordinator.run(),
            Err(SimError::StepLimitExceeded(3))
        ));
    }

    #[test]
    fn lone_bidder_wins_in_first_round() {
        let weights = PreferenceWeights::from_weights([(ProductId(1), 1.0)]);
        let agent = BidderAgent::new(BidderId(1), BiddingPolicy::rational(), weights, 50.0);
        let mut coordinator = single_product_run(vec![agent], 10.0);
        let report = coordinator.run().unwrap();

        let result = report.result_for(ProductId(1)).unwrap();
        assert_eq!(result.winner_id, BidderId(1));
        assert_eq!(result.best_price, 10.0);
        assert_eq!(result.round, 1);
        // Announce at t=1, bid at t=6, final at t=7, agent settles at t=12
        assert_eq!(report.elapsed, 12);
    }

    #[test]
    fn bidder_missing_from_run_stalls_the_round() {
        let weights = PreferenceWeights::from_weights([(ProductId(1), 1.0)]);
        let agent = BidderAgent::new(BidderId(1), BiddingPolicy::rational(), weights, 50.0);
        // Auctioneer expects bidder 2, which never exists
        let auctioneer = Auctioneer::new(AuctionConfig::default(), [BidderId(1), BidderId(2)]);
        let mut coordinator = Coordinator::new(
            auctioneer,
            vec![agent],
            vec![Product::new(ProductId(1), 10.0)],
            1_000,
        );

        match coordinator.run() {
            Err(SimError::Stalled { missing, round, .. }) => {
                assert_eq!(missing, vec![BidderId(2)]);
                assert_eq!(round, 1);
            }
            other => panic!("expected stall, got {other:?}"),
        }
    }
}
