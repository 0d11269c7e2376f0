use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use super::policy::{AgentKind, BiddingPolicy};
use crate::emotion::{EmotionState, EmotionTracker};
use crate::preferences::{PreferenceWeights, scale_utility, win_growth};
use crate::reserve::{Allocation, ReservePriceTable, allocate};
use crate::types::{
    AgentInput, BidOffer, BidderId, FIRST_ROUND, FinalResult, InitialProductInfo, Price,
    ProductId, Round, RoundResult, Ticks, TimeAdvance,
};

/// Budget bookkeeping. `total_budget` only moves when this agent wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
pub struct BudgetState {
    pub total_budget: Price,
    pub money_spent: Price,
    pub purchased: Vec<FinalResult>,
}

impl BudgetState {
    pub fn new(total_budget: Price) -> Self {
        Self {
            total_budget,
            money_spent: 0.0,
            purchased: Vec::new(),
        }
    }

    fn debit(&mut self, result: FinalResult) {
        self.total_budget -= result.best_price;
        self.money_spent += result.best_price;
        self.purchased.push(result);
        debug_assert!(
            self.total_budget >= -1e-9,
            "budget underflow: {}",
            self.total_budget
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Tsify)]
pub struct UtilityState {
    pub raw: f64,
    pub scaled: f64,
}

impl Default for UtilityState {
    fn default() -> Self {
        Self {
            raw: 1.0,
            scaled: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Tsify)]
pub enum AgentPhase {
    /// Waiting for a product.
    Idle,
    /// Still in contention for the current product.
    Bidding,
    /// Dropped out of the current product.
    Withdrawn,
    /// Applying a final result; ready again after the next internal transition.
    Settling,
}

/// Product currently under auction, as this agent sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Lot {
    product: ProductId,
    best_price: Price,
    round: Round,
}

/// A bidding agent. Rational and affective behaviour differ only through
/// `BiddingPolicy`.
#[derive(Debug, Clone)]
pub struct BidderAgent {
    id: BidderId,
    policy: BiddingPolicy,
    weights: PreferenceWeights,
    max_utility: f64,
    budget: BudgetState,
    utility: UtilityState,
    emotion: Option<EmotionTracker>,
    reserve: ReservePriceTable,
    /// Products this agent has seen a final result for.
    settled: BTreeSet<ProductId>,
    lot: Option<Lot>,
    phase: AgentPhase,
    pending: Option<BidOffer>,
    delay: Ticks,
}

impl BidderAgent {
    pub fn new(
        id: BidderId,
        policy: BiddingPolicy,
        weights: PreferenceWeights,
        total_budget: Price,
    ) -> Self {
        let emotion = policy.emotion.map(EmotionTracker::new);
        let settled = BTreeSet::new();
        let reserve = match weights.products().next() {
            Some(first) => allocate(Allocation {
                weights: &weights,
                settled: &settled,
                budget: total_budget,
                active: first,
                emotion: None,
            }),
            None => ReservePriceTable::default(),
        };
        Self {
            id,
            max_utility: weights.max_achievable_utility(),
            policy,
            weights,
            budget: BudgetState::new(total_budget),
            utility: UtilityState::default(),
            emotion,
            reserve,
            settled,
            lot: None,
            phase: AgentPhase::Idle,
            pending: None,
            delay: 5,
        }
    }

    pub fn with_delay(mut self, delay: Ticks) -> Self {
        self.delay = delay;
        self
    }

    pub fn id(&self) -> BidderId {
        self.id
    }

    pub fn kind(&self) -> AgentKind {
        self.policy.kind
    }

    pub fn weights(&self) -> &PreferenceWeights {
        &self.weights
    }

    pub fn budget(&self) -> &BudgetState {
        &self.budget
    }

    pub fn utility(&self) -> UtilityState {
        self.utility
    }

    pub fn emotion(&self) -> Option<EmotionState> {
        self.emotion.as_ref().map(EmotionTracker::state)
    }

    pub fn reserve_prices(&self) -> &ReservePriceTable {
        &self.reserve
    }

    pub fn settled(&self) -> &BTreeSet<ProductId> {
        &self.settled
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    /// Reserve prices summed over products not yet settled.
    pub fn remaining_reserve_total(&self) -> Price {
        self.reserve
            .iter()
            .filter(|(id, _)| !self.settled.contains(id))
            .map(|(_, p)| p)
            .sum()
    }

    // === EVENT HANDLING ===

    /// Apply every event delivered in one activation, in priority order.
    pub fn external_transition(&mut self, mut inputs: Vec<AgentInput>) {
        inputs.sort_by_key(AgentInput::priority);
        for input in inputs {
            match input {
                AgentInput::Final(result) => self.on_final_result(result),
                AgentInput::Round(result) => self.on_round_result(result),
                AgentInput::Announce(info) => self.on_product_announced(info),
            }
        }
    }

    pub fn on_product_announced(&mut self, info: InitialProductInfo) {
        // Anxiety carried over from the previous product still counts here
        let intensity = self.emotion.as_ref().map(EmotionTracker::intensity);
        self.reserve = allocate(Allocation {
            weights: &self.weights,
            settled: &self.settled,
            budget: self.budget.total_budget,
            active: info.product_id,
            emotion: intensity,
        });

        let lot = Lot {
            product: info.product_id,
            best_price: info.best_price,
            round: FIRST_ROUND,
        };
        self.lot = Some(lot);

        let staying = self.decide(lot);
        if let Some(tracker) = self.emotion.as_mut() {
            tracker.on_announce(staying);
        }
        self.respond(lot, staying);
    }

    pub fn on_round_result(&mut self, result: RoundResult) {
        let Some(lot) = self.lot.as_mut() else {
            return;
        };
        if lot.product != result.product_id {
            return;
        }
        lot.best_price = result.best_price;
        lot.round = result.round;
        let lot = *lot;

        if self.phase == AgentPhase::Withdrawn {
            return;
        }

        let staying = self.decide(lot);
        if staying {
            if let Some(tracker) = self.emotion.as_mut() {
                tracker.on_stay_in();
            }
        }
        self.respond(lot, staying);
    }

    pub fn on_final_result(&mut self, result: FinalResult) {
        // A repeated final result must not debit or score twice
        if self.settled.contains(&result.product_id) {
            return;
        }
        let won = result.winner_id == self.id;
        if won {
            self.budget.debit(result);
        }

        let weight = self.weights.get(result.product_id);
        let factor = if won {
            win_growth(weight)
        } else {
            let intensity = self.emotion.as_ref().map_or(0.0, EmotionTracker::intensity);
            self.policy.loss.factor(weight, intensity)
        };
        self.utility.raw = (self.utility.raw * factor).max(0.0);
        self.utility.scaled = scale_utility(self.utility.raw, self.max_utility);

        if let Some(tracker) = self.emotion.as_mut() {
            tracker.on_outcome(won);
        }

        self.settled.insert(result.product_id);
        self.lot = None;
        self.pending = None;
        self.phase = AgentPhase::Settling;

        #[cfg(feature = "instrument")]
        {
            let emotion = self.emotion();
            tracing::info!(
                target: "agent_state",
                bidder_id = self.id.0,
                kind = self.policy.kind.as_str(),
                product_id = result.product_id.0,
                won = won,
                total_budget = self.budget.total_budget,
                money_spent = self.budget.money_spent,
                raw_utility = self.utility.raw,
                scaled_utility = self.utility.scaled,
                anxiety = emotion.map_or(0.0, |e| e.anxiety),
                frustration = emotion.map_or(0.0, |e| e.frustration),
            );
        }
    }

    fn decide(&self, lot: Lot) -> bool {
        self.reserve.get(lot.product) >= lot.best_price
    }

    fn respond(&mut self, lot: Lot, staying: bool) {
        let offer = if staying {
            let price = self
                .policy
                .bid_price
                .price(lot.best_price, self.reserve.get(lot.product));
            self.phase = AgentPhase::Bidding;
            BidOffer::stay(self.id, lot.product, price, lot.round)
        } else {
            self.phase = AgentPhase::Withdrawn;
            BidOffer::withdraw(self.id, lot.product, lot.round)
        };
        self.pending = Some(offer);
    }

    // === SCHEDULER CONTRACT ===

    pub fn output(&self) -> Vec<BidOffer> {
        let Some(offer) = self.pending else {
            return Vec::new();
        };

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "bid",
            bidder_id = self.id.0,
            kind = self.policy.kind.as_str(),
            product_id = offer.product_id.0,
            round = offer.round,
            price_proposal = offer.price_proposal,
            stay_in = offer.stay_in,
            reserve_price = self.reserve.get(offer.product_id),
        );

        vec![offer]
    }

    pub fn internal_transition(&mut self) {
        self.pending = None;
        if self.phase == AgentPhase::Settling {
            self.phase = AgentPhase::Idle;
        }
    }

    pub fn time_advance(&self) -> TimeAdvance {
        if self.pending.is_some() || self.phase == AgentPhase::Settling {
            TimeAdvance::After(self.delay)
        } else {
            TimeAdvance::Passive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmotionConfig;

    const A: ProductId = ProductId(1);
    const B: ProductId = ProductId(2);

    fn weights() -> PreferenceWeights {
        PreferenceWeights::from_weights([(A, 0.5), (B, 0.5)])
    }

    fn announce(product: ProductId, price: Price) -> InitialProductInfo {
        InitialProductInfo {
            product_id: product,
            initial_price: price,
            best_price: price,
            ranking: None,
        }
    }

    fn final_result(product: ProductId, winner: BidderId, price: Price) -> FinalResult {
        FinalResult {
            product_id: product,
            winner_id: winner,
            best_price: price,
            initial_price: price,
            round: 1,
        }
    }

    #[test]
    fn rational_bids_reserve_when_affordable() {
        let mut agent = BidderAgent::new(BidderId(1), BiddingPolicy::rational(), weights(), 100.0);
        agent.on_product_announced(announce(A, 10.0));

        let out = agent.output();
        assert_eq!(out.len(), 1);
        assert!(out[0].stay_in);
        assert!((out[0].price_proposal - 50.0).abs() < 1e-9);
        assert_eq!(out[0].round, FIRST_ROUND);
        assert_eq!(agent.phase(), AgentPhase::Bidding);
    }

    #[test]
    fn affective_bids_current_best() {
        let mut agent = BidderAgent::new(
            BidderId(1),
            BiddingPolicy::affective(EmotionConfig::default()),
            weights(),
            100.0,
        );
        agent.on_product_announced(announce(A, 10.0));
        let out = agent.output();
        assert_eq!(out[0].price_proposal, 10.0);
        assert_eq!(agent.emotion().unwrap().anxiety, 1.0);
    }

    #[test]
    fn withdraws_once_price_passes_reserve() {
        let mut agent = BidderAgent::new(BidderId(1), BiddingPolicy::rational(), weights(), 100.0);
        agent.on_product_announced(announce(A, 10.0));
        agent.internal_transition();

        agent.on_round_result(RoundResult {
            product_id: A,
            best_price: 60.0,
            round: 2,
        });
        let out = agent.output();
        assert_eq!(out.len(), 1);
        assert!(!out[0].stay_in);
        assert_eq!(out[0].price_proposal, 0.0);
        assert_eq!(out[0].round, 2);
        agent.internal_transition();

        // Already out: later rounds produce nothing
        agent.on_round_result(RoundResult {
            product_id: A,
            best_price: 72.0,
            round: 3,
        });
        assert!(agent.output().is_empty());
        assert!(agent.time_advance().is_passive());
    }

    #[test]
    fn anxiety_steps_each_round_stayed_in() {
        let mut agent = BidderAgent::new(
            BidderId(1),
            BiddingPolicy::affective(EmotionConfig::default()),
            weights(),
            100.0,
        );
        agent.on_product_announced(announce(A, 10.0));
        for round in 2..5 {
            agent.on_round_result(RoundResult {
                product_id: A,
                best_price: 10.0 + round as f64,
                round,
            });
        }
        assert_eq!(agent.emotion().unwrap().anxiety, 4.0);
    }

    #[test]
    fn winning_debits_budget_once() {
        let mut agent = BidderAgent::new(BidderId(1), BiddingPolicy::rational(), weights(), 100.0);
        agent.on_product_announced(announce(A, 10.0));
        agent.on_final_result(final_result(A, BidderId(1), 30.0));
        agent.on_final_result(final_result(A, BidderId(1), 30.0));

        assert_eq!(agent.budget().total_budget, 70.0);
        assert_eq!(agent.budget().money_spent, 30.0);
        assert_eq!(agent.budget().purchased.len(), 1);
        assert!(agent.settled().contains(&A));
        assert!((agent.utility().raw - 2f64.powf(0.5)).abs() < 1e-12);
    }

    #[test]
    fn losing_leaves_budget_untouched() {
        let mut agent = BidderAgent::new(BidderId(1), BiddingPolicy::rational(), weights(), 100.0);
        agent.on_product_announced(announce(A, 10.0));
        agent.on_final_result(final_result(A, BidderId(2), 30.0));

        assert_eq!(agent.budget().total_budget, 100.0);
        assert_eq!(agent.utility().raw, 1.0);
    }

    #[test]
    fn losing_costs_affective_utility_only() {
        let mut feeler = BidderAgent::new(
            BidderId(1),
            BiddingPolicy::affective(EmotionConfig::default()),
            weights(),
            100.0,
        );
        let mut thinker =
            BidderAgent::new(BidderId(2), BiddingPolicy::rational(), weights(), 100.0);

        for agent in [&mut feeler, &mut thinker] {
            agent.on_product_announced(announce(A, 10.0));
            agent.on_final_result(final_result(A, BidderId(3), 30.0));
        }

        let felt = feeler.utility();
        let reasoned = thinker.utility();
        assert!(felt.raw < 1.0, "affective loss should cost utility, raw={}", felt.raw);
        assert_eq!(reasoned.raw, 1.0);
        for u in [felt, reasoned] {
            assert!((0.0..=1.0).contains(&u.scaled), "scaled utility {}", u.scaled);
        }
        assert_eq!(feeler.budget().total_budget, 100.0);
    }

    #[test]
    fn settling_then_idle() {
        let mut agent = BidderAgent::new(BidderId(1), BiddingPolicy::rational(), weights(), 100.0);
        agent.on_final_result(final_result(A, BidderId::NO_WINNER, 10.0));
        assert_eq!(agent.phase(), AgentPhase::Settling);
        assert_eq!(agent.time_advance(), TimeAdvance::After(5));
        agent.internal_transition();
        assert_eq!(agent.phase(), AgentPhase::Idle);
        assert!(agent.time_advance().is_passive());
    }

    #[test]
    fn final_then_announce_in_one_activation() {
        let mut agent = BidderAgent::new(BidderId(1), BiddingPolicy::rational(), weights(), 100.0);
        agent.on_product_announced(announce(A, 10.0));
        agent.internal_transition();

        // Delivered out of order on purpose
        agent.external_transition(vec![
            AgentInput::Announce(announce(B, 5.0)),
            AgentInput::Final(final_result(A, BidderId(1), 40.0)),
        ]);

        // Budget was debited before B's reserve was computed; A left the pool
        assert!((agent.reserve_prices().get(B) - 60.0).abs() < 1e-9);
        assert_eq!(agent.reserve_prices().get(A), 0.0);
        let out = agent.output();
        assert_eq!(out[0].product_id, B);
    }

    #[test]
    fn round_result_for_other_product_is_ignored() {
        let mut agent = BidderAgent::new(BidderId(1), BiddingPolicy::rational(), weights(), 100.0);
        agent.on_product_announced(announce(A, 10.0));
        agent.internal_transition();
        agent.on_round_result(RoundResult {
            product_id: B,
            best_price: 99.0,
            round: 2,
        });
        assert!(agent.output().is_empty());
        assert_eq!(agent.phase(), AgentPhase::Bidding);
    }
}
