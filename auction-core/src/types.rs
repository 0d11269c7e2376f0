// Core ID types, products and the four auction messages

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

// === TYPE ALIASES ===

pub type Price = f64;
pub type Weight = f64;
pub type Round = u32;
/// Announcing a product opens this round.
pub const FIRST_ROUND: Round = 1;
/// Logical clock unit used by the coordinator.
pub type Ticks = u64;

// === NEWTYPE IDS ===

#[derive(
    Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Tsify,
)]
pub struct ProductId(pub u32);

impl ProductId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

/// Bidder identifier. Id 0 is reserved for "no winner".
#[derive(
    Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Tsify,
)]
pub struct BidderId(pub u32);

impl BidderId {
    pub const NO_WINNER: BidderId = BidderId(0);

    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn is_no_winner(self) -> bool {
        self == Self::NO_WINNER
    }
}

// === PRODUCT ===

/// A single-unit lot put up for auction.
///
/// Only the auctioneer mutates `current_best_price` and `sold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct Product {
    pub id: ProductId,
    pub initial_price: Price,
    pub current_best_price: Price,
    pub sold: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
    #[serde(default)]
    pub ranking: Option<f64>,
}

impl Product {
    pub fn new(id: ProductId, initial_price: Price) -> Self {
        Self {
            id,
            initial_price,
            current_best_price: initial_price,
            sold: false,
            name: String::new(),
            category: String::new(),
            subcategory: String::new(),
            ranking: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_category(
        mut self,
        category: impl Into<String>,
        subcategory: impl Into<String>,
    ) -> Self {
        self.category = category.into();
        self.subcategory = subcategory.into();
        self
    }

    pub fn with_ranking(mut self, ranking: f64) -> Self {
        self.ranking = Some(ranking);
        self
    }

    /// Announcement message for this product at its current best price.
    pub fn announcement(&self) -> InitialProductInfo {
        InitialProductInfo {
            product_id: self.id,
            initial_price: self.initial_price,
            best_price: self.current_best_price,
            ranking: self.ranking,
        }
    }
}

// === MESSAGES ===

/// Auctioneer → agents: a product is open for bidding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Tsify)]
pub struct InitialProductInfo {
    pub product_id: ProductId,
    pub initial_price: Price,
    pub best_price: Price,
    pub ranking: Option<f64>,
}

/// Agent → auctioneer: stay in at `price_proposal`, or withdraw (`stay_in = false`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Tsify)]
pub struct BidOffer {
    pub client_id: BidderId,
    pub product_id: ProductId,
    pub price_proposal: Price,
    pub stay_in: bool,
    /// Round this bid answers.
    pub round: Round,
}

impl BidOffer {
    pub fn stay(client_id: BidderId, product_id: ProductId, price: Price, round: Round) -> Self {
        Self {
            client_id,
            product_id,
            price_proposal: price,
            stay_in: true,
            round,
        }
    }

    pub fn withdraw(client_id: BidderId, product_id: ProductId, round: Round) -> Self {
        Self {
            client_id,
            product_id,
            price_proposal: 0.0,
            stay_in: false,
            round,
        }
    }
}

/// Auctioneer → agents: round was contested, price escalated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Tsify)]
pub struct RoundResult {
    pub product_id: ProductId,
    pub best_price: Price,
    pub round: Round,
}

/// Auctioneer → agents: auction for a product is over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Tsify)]
pub struct FinalResult {
    pub product_id: ProductId,
    pub winner_id: BidderId,
    pub best_price: Price,
    pub initial_price: Price,
    pub round: Round,
}

impl FinalResult {
    pub fn winner(&self) -> Option<BidderId> {
        (!self.winner_id.is_no_winner()).then_some(self.winner_id)
    }

    pub fn is_sold(&self) -> bool {
        self.winner().is_some()
    }
}

/// Products that have been auctioned off (sold or not), derived from a
/// stream of final results.
pub fn settled_products<'a>(
    results: impl IntoIterator<Item = &'a FinalResult>,
) -> BTreeSet<ProductId> {
    results.into_iter().map(|r| r.product_id).collect()
}

// === COMPONENT EVENTS ===

/// Inbound events for a bidder. Events delivered in the same activation
/// are applied in `priority()` order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AgentInput {
    Final(FinalResult),
    Round(RoundResult),
    Announce(InitialProductInfo),
}

impl AgentInput {
    /// FinalResult before RoundResult before ProductAnnounced. A final
    /// result and the announcement of the following product routinely
    /// arrive together; settling first keeps the budget current for the
    /// next reserve price.
    pub fn priority(&self) -> u8 {
        match self {
            AgentInput::Final(_) => 0,
            AgentInput::Round(_) => 1,
            AgentInput::Announce(_) => 2,
        }
    }
}

/// Inbound events for the auctioneer.
#[derive(Debug, Clone, PartialEq)]
pub enum AuctioneerInput {
    Products(Vec<Product>),
    Bids(Vec<BidOffer>),
}

/// Broadcast messages produced by the auctioneer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuctioneerOutput {
    Announce(InitialProductInfo),
    Round(RoundResult),
    Final(FinalResult),
}

impl AuctioneerOutput {
    pub fn to_agent_input(self) -> AgentInput {
        match self {
            AuctioneerOutput::Announce(info) => AgentInput::Announce(info),
            AuctioneerOutput::Round(result) => AgentInput::Round(result),
            AuctioneerOutput::Final(result) => AgentInput::Final(result),
        }
    }
}

/// Scheduler contract: when a component next wants to be activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeAdvance {
    /// Nothing scheduled until the next external event.
    Passive,
    After(Ticks),
}

impl TimeAdvance {
    pub fn is_passive(self) -> bool {
        matches!(self, TimeAdvance::Passive)
    }
}
