//! Anxiety and frustration for affective bidders.
//!
//! Anxiety builds while an agent keeps bidding on the same product and is
//! reset when the next product is announced. Frustration reacts to auction
//! outcomes: cleared by a win, pinned to its cap by any loss. Both feed
//! `intensity()`, which inflates the active product's weight in the reserve
//! price allocation.

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::config::{EmotionConfig, EmotionScaling};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Tsify)]
pub struct EmotionState {
    pub anxiety: f64,
    pub frustration: f64,
}

impl EmotionState {
    pub fn calm() -> Self {
        Self {
            anxiety: 0.0,
            frustration: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmotionTracker {
    config: EmotionConfig,
    state: EmotionState,
}

impl EmotionTracker {
    pub fn new(config: EmotionConfig) -> Self {
        Self {
            config,
            state: EmotionState::calm(),
        }
    }

    pub fn state(&self) -> EmotionState {
        self.state
    }

    pub fn config(&self) -> &EmotionConfig {
        &self.config
    }

    /// New product: anxiety starts over, and staying in counts as the first step.
    pub fn on_announce(&mut self, staying_in: bool) {
        self.state.anxiety = 0.0;
        if staying_in {
            self.on_stay_in();
        }
    }

    pub fn on_stay_in(&mut self) {
        self.state.anxiety = (self.state.anxiety + self.config.anxiety_step)
            .clamp(0.0, self.config.anxiety_cap);
    }

    pub fn on_outcome(&mut self, won: bool) {
        self.state.frustration = if won { 0.0 } else { self.config.frustration_cap };
    }

    /// `f(anxiety, frustration)`: zero when calm, increasing in both.
    pub fn intensity(&self) -> f64 {
        emotional_intensity(self.state, &self.config)
    }
}

pub fn emotional_intensity(state: EmotionState, config: &EmotionConfig) -> f64 {
    let total = state.anxiety.max(0.0) + state.frustration.max(0.0);
    match config.scaling {
        EmotionScaling::NormalizedSum => {
            let caps = config.anxiety_cap + config.frustration_cap;
            if caps <= 0.0 { 0.0 } else { total / caps }
        }
        EmotionScaling::LogCompressed => total.ln_1p(),
    }
}
