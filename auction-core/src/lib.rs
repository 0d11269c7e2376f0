use wasm_bindgen::prelude::*;

pub mod agents;
pub mod auctioneer;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod emotion;
pub mod error;
pub mod preferences;
pub mod reserve;
pub mod types;

pub use agents::*;
pub use auctioneer::*;
pub use catalog::*;
pub use config::*;
pub use coordinator::*;
pub use emotion::*;
pub use error::SimError;
pub use preferences::*;
pub use reserve::*;
pub use types::*;

#[cfg(feature = "instrument")]
pub use instrument;

// ============================================================================
// WASM API - AuctionSimulation
// ============================================================================

#[wasm_bindgen]
pub struct AuctionSimulation {
    coordinator: Coordinator,
    report: Option<SimulationReport>,
}

#[wasm_bindgen]
impl AuctionSimulation {
    /// Default population and catalog, seeded.
    #[wasm_bindgen(constructor)]
    pub fn new(seed: u64) -> Result<AuctionSimulation, JsError> {
        // Better panic messages in browser console
        console_error_panic_hook::set_once();
        Self::from_config(SimulationConfig::default().with_seed(seed))
    }

    /// Build from a (possibly partial) JSON `SimulationConfig`.
    #[wasm_bindgen]
    pub fn from_config_json(json: &str) -> Result<AuctionSimulation, JsError> {
        console_error_panic_hook::set_once();
        let config: SimulationConfig = serde_json::from_str(json).map_err(SimError::from)?;
        Self::from_config(config)
    }

    /// Run a JSON `SimulationConfig` against a JSON product feed
    /// (see `ProductRecord`) instead of a generated catalog.
    #[wasm_bindgen]
    pub fn from_catalog_json(
        config_json: &str,
        catalog_json: &str,
    ) -> Result<AuctionSimulation, JsError> {
        console_error_panic_hook::set_once();
        let config: SimulationConfig =
            serde_json::from_str(config_json).map_err(SimError::from)?;
        let catalog = ProductCatalog::from_json(catalog_json)?;
        Ok(Self {
            coordinator: Coordinator::with_catalog(&config, &catalog)?,
            report: None,
        })
    }

    /// Advance one coordinator step. Returns false once the run is quiescent.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<bool, JsError> {
        Ok(self.coordinator.step()?)
    }

    /// Run to completion and return the report.
    #[wasm_bindgen]
    pub fn run(&mut self) -> Result<SimulationReport, JsError> {
        let report = self.coordinator.run()?;
        self.report = Some(report.clone());
        Ok(report)
    }

    #[wasm_bindgen]
    pub fn now(&self) -> u64 {
        self.coordinator.now()
    }

    /// Report of the finished run, or a snapshot if `run` has not completed.
    #[wasm_bindgen]
    pub fn report_json(&self) -> Result<String, JsError> {
        let json = match &self.report {
            Some(report) => serde_json::to_string(report),
            None => serde_json::to_string(&self.coordinator.report()),
        };
        Ok(json.map_err(SimError::from)?)
    }
}

impl AuctionSimulation {
    pub fn from_config(config: SimulationConfig) -> Result<AuctionSimulation, JsError> {
        Ok(Self {
            coordinator: Coordinator::from_config(&config)?,
            report: None,
        })
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn last_report(&self) -> Option<&SimulationReport> {
        self.report.as_ref()
    }
}
