#![cfg(feature = "instrument")]

use auction_core::instrument::ScopedRecorder;
use auction_core::{Coordinator, SimulationConfig};
use polars::prelude::*;

#[test]
fn run_emits_one_row_per_message() {
    let config = SimulationConfig::default().with_seed(42);
    let mut rec = ScopedRecorder::in_memory();
    let mut sim = Coordinator::from_config(&config).unwrap();
    let report = sim.run().unwrap();

    let dfs = rec.get();
    let announce = dfs.get("announce").expect("announce dataframe");
    let finals = dfs.get("final_result").expect("final_result dataframe");
    let bids = dfs.get("bid").expect("bid dataframe");

    assert_eq!(announce.height(), config.products_per_run);
    assert_eq!(finals.height(), config.products_per_run);
    let rounds = dfs.get("round").map_or(0, |df| df.height());
    assert_eq!(rounds as u64, report.round_results);

    let sold = finals
        .clone()
        .lazy()
        .filter(col("sold").eq(lit(true)))
        .collect()
        .unwrap()
        .height();
    assert_eq!(sold, report.sold_count());

    // Every announcement draws a first-round answer from every bidder
    let first_round = bids
        .clone()
        .lazy()
        .filter(col("round").eq(lit(1u64)))
        .collect()
        .unwrap()
        .height();
    assert_eq!(first_round, config.products_per_run * report.agents.len());
}

#[test]
fn agent_state_tracks_every_settlement() {
    let mut config = SimulationConfig::default().with_seed(7);
    config.population.affective_agents = 2;
    config.population.rational_agents = 1;
    let mut rec = ScopedRecorder::in_memory();
    Coordinator::from_config(&config).unwrap().run().unwrap();

    let dfs = rec.get();
    let states = dfs.get("agent_state").expect("agent_state dataframe");
    assert_eq!(states.height(), config.products_per_run * 3);

    let frustrated = states
        .clone()
        .lazy()
        .filter(
            col("kind")
                .eq(lit("affective"))
                .and(col("won").eq(lit(false))),
        )
        .select([col("frustration").min().alias("min_frustration")])
        .collect()
        .unwrap();
    let min = frustrated
        .column("min_frustration")
        .unwrap()
        .f64()
        .unwrap()
        .get(0);
    if let Some(min) = min {
        assert_eq!(min, config.emotion.frustration_cap);
    }
}
