use thiserror::Error;

use crate::types::{BidderId, ProductId, Round};

/// Errors surfaced by the coordinator and configuration layer.
///
/// Auction decision logic never fails: lookup misses resolve to zero and
/// empty pools resolve to unsold products.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Stalled on product {product_id:?} round {round}: missing bids from {missing:?}")]
    Stalled {
        product_id: ProductId,
        round: Round,
        missing: Vec<BidderId>,
    },

    #[error("Step limit exceeded after {0} steps")]
    StepLimitExceeded(u64),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
