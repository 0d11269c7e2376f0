use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::config::EmotionConfig;
use crate::types::Price;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
pub enum AgentKind {
    Rational,
    Affective,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Rational => "rational",
            AgentKind::Affective => "affective",
        }
    }
}

/// Price disclosed while staying in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidPriceRule {
    /// Match the current best price (full commitment).
    CurrentBest,
    /// Disclose the agent's own reserve price.
    Reserve,
}

impl BidPriceRule {
    pub fn price(&self, current_best: Price, reserve: Price) -> Price {
        match self {
            BidPriceRule::CurrentBest => current_best,
            BidPriceRule::Reserve => reserve,
        }
    }
}

/// Utility factor applied when an auction is lost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LossRule {
    /// Losing leaves utility unchanged.
    Neutral,
    /// Losing costs `penalty * weight * intensity` of current utility.
    EmotionPenalty { penalty: f64 },
}

impl LossRule {
    pub fn factor(&self, weight: f64, intensity: f64) -> f64 {
        match self {
            LossRule::Neutral => 1.0,
            LossRule::EmotionPenalty { penalty } => {
                (1.0 - penalty * weight * intensity).max(0.0)
            }
        }
    }
}

/// Parameters distinguishing rational from affective bidders.
#[derive(Debug, Clone, PartialEq)]
pub struct BiddingPolicy {
    pub kind: AgentKind,
    /// Emotion parameters; `None` disables emotion tracking entirely.
    pub emotion: Option<EmotionConfig>,
    pub bid_price: BidPriceRule,
    pub loss: LossRule,
}

impl BiddingPolicy {
    pub fn rational() -> Self {
        Self {
            kind: AgentKind::Rational,
            emotion: None,
            bid_price: BidPriceRule::Reserve,
            loss: LossRule::Neutral,
        }
    }

    pub fn affective(emotion: EmotionConfig) -> Self {
        Self {
            kind: AgentKind::Affective,
            emotion: Some(emotion),
            bid_price: BidPriceRule::CurrentBest,
            loss: LossRule::EmotionPenalty {
                penalty: emotion.loss_penalty,
            },
        }
    }
}
