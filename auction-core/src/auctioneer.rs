//! English auction state machine.
//!
//! Products are auctioned one at a time from a FIFO queue:
//!
//! ```text
//! AwaitingProducts → ProductAnnounced → RoundOpen ─┬─ ≥2 stay in → RoundEscalated → RoundOpen
//!                                                  └─ ≤1 stays in → ProductResolved → (next product | Done)
//! ```
//!
//! Every bidder still in contention must answer a round before it resolves.
//! Each activation produces at most one of: an announcement, a round result,
//! or a final result (with the next product's announcement piggybacked).

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::config::AuctionConfig;
use crate::types::{
    AuctioneerInput, AuctioneerOutput, BidOffer, BidderId, FIRST_ROUND, FinalResult,
    InitialProductInfo, Product, ProductId, Round, RoundResult, Ticks, TimeAdvance,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuctionPhase {
    AwaitingProducts,
    ProductAnnounced,
    RoundOpen,
    RoundEscalated,
    ProductResolved,
    Done,
}

/// Output waiting for the next internal transition.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Pending {
    Announce(InitialProductInfo),
    Escalate(RoundResult),
    Settle {
        result: FinalResult,
        next: Option<InitialProductInfo>,
    },
}

/// Bids still missing from the open round.
#[derive(Debug, Clone, PartialEq)]
pub struct AwaitingBids {
    pub product_id: ProductId,
    pub round: Round,
    pub missing: Vec<BidderId>,
}

#[derive(Debug, Clone)]
pub struct Auctioneer {
    config: AuctionConfig,
    /// Every bidder taking part in the run.
    bidders: BTreeSet<BidderId>,
    queue: VecDeque<Product>,
    active: Option<Product>,
    round: Round,
    /// Bidders still in contention for the active product.
    pool: BTreeSet<BidderId>,
    received: BTreeMap<BidderId, BidOffer>,
    settled: BTreeSet<ProductId>,
    results: Vec<FinalResult>,
    /// Products taken off the block, with `sold` and final best price set.
    resolved: Vec<Product>,
    phase: AuctionPhase,
    pending: Option<Pending>,
    delay: Ticks,
}

impl Auctioneer {
    pub fn new(config: AuctionConfig, bidders: impl IntoIterator<Item = BidderId>) -> Self {
        Self {
            config,
            bidders: bidders
                .into_iter()
                .filter(|id| !id.is_no_winner())
                .collect(),
            queue: VecDeque::new(),
            active: None,
            round: FIRST_ROUND,
            pool: BTreeSet::new(),
            received: BTreeMap::new(),
            settled: BTreeSet::new(),
            results: Vec::new(),
            resolved: Vec::new(),
            phase: AuctionPhase::AwaitingProducts,
            pending: None,
            delay: 1,
        }
    }

    pub fn with_delay(mut self, delay: Ticks) -> Self {
        self.delay = delay;
        self
    }

    pub fn phase(&self) -> AuctionPhase {
        self.phase
    }

    pub fn active_product(&self) -> Option<&Product> {
        self.active.as_ref()
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Every final result emitted so far, in order.
    pub fn results(&self) -> &[FinalResult] {
        &self.results
    }

    /// Auctioned products in resolution order.
    pub fn resolved(&self) -> &[Product] {
        &self.resolved
    }

    /// Products already auctioned (sold or unsold).
    pub fn settled(&self) -> &BTreeSet<ProductId> {
        &self.settled
    }

    pub fn is_done(&self) -> bool {
        self.phase == AuctionPhase::Done
    }

    /// Bids the open round is still waiting for, if a round is open.
    pub fn awaiting_bids(&self) -> Option<AwaitingBids> {
        if self.phase != AuctionPhase::RoundOpen {
            return None;
        }
        let product = self.active.as_ref()?;
        Some(AwaitingBids {
            product_id: product.id,
            round: self.round,
            missing: self
                .pool
                .iter()
                .filter(|id| !self.received.contains_key(id))
                .copied()
                .collect(),
        })
    }

    // === INBOUND ===

    pub fn external_transition(&mut self, inputs: Vec<AuctioneerInput>) {
        for input in inputs {
            match input {
                AuctioneerInput::Products(products) => self.receive_products(products),
                AuctioneerInput::Bids(bids) => self.receive_bids(bids),
            }
        }
    }

    pub fn receive_products(&mut self, products: Vec<Product>) {
        self.queue.extend(products);
        let idle = matches!(
            self.phase,
            AuctionPhase::AwaitingProducts | AuctionPhase::Done
        );
        if idle && self.pending.is_none() {
            self.open_next();
        }
    }

    /// Record bids for the open round; resolve once the whole pool has answered.
    pub fn receive_bids(&mut self, bids: Vec<BidOffer>) {
        if self.phase != AuctionPhase::RoundOpen {
            return;
        }
        let Some(product_id) = self.active.as_ref().map(|p| p.id) else {
            return;
        };

        for bid in bids {
            let current = bid.product_id == product_id && bid.round == self.round;
            if !current || !self.pool.contains(&bid.client_id) {
                continue;
            }
            self.received.entry(bid.client_id).or_insert(bid);
        }

        if self.received.len() == self.pool.len() {
            self.resolve_round();
        }
    }

    // === ROUND RESOLUTION ===

    fn resolve_round(&mut self) {
        let stayers: BTreeSet<BidderId> = self
            .received
            .values()
            .filter(|b| b.stay_in)
            .map(|b| b.client_id)
            .collect();

        match stayers.len() {
            0 => self.resolve(BidderId::NO_WINNER),
            1 => {
                let winner = stayers.iter().next().copied().unwrap_or(BidderId::NO_WINNER);
                self.resolve(winner);
            }
            _ => self.escalate(stayers),
        }
    }

    fn escalate(&mut self, stayers: BTreeSet<BidderId>) {
        let Some(product) = self.active.as_mut() else {
            return;
        };
        let previous = product.current_best_price;
        product.current_best_price = self.config.escalate(previous);

        #[cfg(feature = "instrument")]
        {
            let top_proposal: f64 = self
                .received
                .values()
                .map(|b| b.price_proposal)
                .fold(0.0, f64::max);
            tracing::info!(
                target: "round",
                product_id = product.id.0,
                round = self.round,
                active_bidders = stayers.len() as u64,
                previous_price = previous,
                best_price = product.current_best_price,
                top_proposal = top_proposal,
            );
        }

        self.round += 1;
        self.pool = stayers;
        self.received.clear();
        self.pending = Some(Pending::Escalate(RoundResult {
            product_id: product.id,
            best_price: product.current_best_price,
            round: self.round,
        }));
        self.phase = AuctionPhase::RoundEscalated;
    }

    /// Close the active product and line up the next one.
    fn resolve(&mut self, winner: BidderId) {
        let Some(mut product) = self.active.take() else {
            return;
        };
        product.sold = !winner.is_no_winner();
        let result = FinalResult {
            product_id: product.id,
            winner_id: winner,
            best_price: product.current_best_price,
            initial_price: product.initial_price,
            round: self.round,
        };
        self.settled.insert(product.id);
        self.results.push(result);
        self.resolved.push(product);

        // With no bidders the next product cannot be announced, only settled
        let next = if self.bidders.is_empty() {
            None
        } else {
            self.queue.pop_front().map(|p| self.activate(p))
        };

        self.pending = Some(Pending::Settle { result, next });
        self.phase = AuctionPhase::ProductResolved;
    }

    fn activate(&mut self, mut product: Product) -> InitialProductInfo {
        product.current_best_price = product.initial_price;
        product.sold = false;
        let info = product.announcement();
        self.active = Some(product);
        self.round = FIRST_ROUND;
        self.pool = self.bidders.clone();
        self.received.clear();
        info
    }

    fn open_next(&mut self) {
        let Some(product) = self.queue.pop_front() else {
            if !self.results.is_empty() {
                self.phase = AuctionPhase::Done;
            }
            return;
        };
        let info = self.activate(product);
        if self.pool.is_empty() {
            // Empty initial pool: unsold without holding an auction
            self.resolve(BidderId::NO_WINNER);
        } else {
            self.pending = Some(Pending::Announce(info));
            self.phase = AuctionPhase::ProductAnnounced;
        }
    }

    // === SCHEDULER CONTRACT ===

    pub fn output(&self) -> Vec<AuctioneerOutput> {
        let Some(pending) = self.pending else {
            return Vec::new();
        };

        match pending {
            Pending::Announce(info) => {
                log_announce(&info);
                vec![AuctioneerOutput::Announce(info)]
            }
            Pending::Escalate(result) => vec![AuctioneerOutput::Round(result)],
            Pending::Settle { result, next } => {
                #[cfg(feature = "instrument")]
                tracing::info!(
                    target: "final_result",
                    product_id = result.product_id.0,
                    winner_id = result.winner_id.0,
                    sold = result.is_sold(),
                    best_price = result.best_price,
                    initial_price = result.initial_price,
                    round = result.round,
                );

                let mut out = vec![AuctioneerOutput::Final(result)];
                if let Some(info) = next {
                    log_announce(&info);
                    out.push(AuctioneerOutput::Announce(info));
                }
                out
            }
        }
    }

    pub fn internal_transition(&mut self) {
        match self.pending.take() {
            Some(Pending::Announce(_))
            | Some(Pending::Escalate(_))
            | Some(Pending::Settle { next: Some(_), .. }) => {
                self.phase = AuctionPhase::RoundOpen;
            }
            Some(Pending::Settle { next: None, .. }) => {
                if self.queue.is_empty() {
                    self.phase = AuctionPhase::Done;
                } else {
                    self.open_next();
                }
            }
            None => {}
        }
    }

    pub fn time_advance(&self) -> TimeAdvance {
        if self.pending.is_some() {
            TimeAdvance::After(self.delay)
        } else {
            TimeAdvance::Passive
        }
    }
}

#[cfg_attr(not(feature = "instrument"), allow(unused_variables))]
fn log_announce(info: &InitialProductInfo) {
    #[cfg(feature = "instrument")]
    tracing::info!(
        target: "announce",
        product_id = info.product_id.0,
        initial_price = info.initial_price,
        best_price = info.best_price,
    );
}
