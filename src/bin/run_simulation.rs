//! CLI front-end for one clearinghouse simulation run.
//!
//! Usage:
//!   run_simulation --config run.toml [--seed N] [--out stats.json]
//!
//! Loads a TOML config, optionally overrides its seed from the command
//! line, runs the simulation to completion, and writes the resulting
//! statistics as JSON — to a file if `--out` is given, to stdout otherwise.

#![forbid(unsafe_code)]

use std::{env, fs};

use kidney_exchange::population::PoolDistribution;
use kidney_exchange::{SimConfig, Simulation};
use tracing::info;

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "run_simulation=info".into()))
        .with_target(false)
        .compact()
        .init();

    let args: Vec<String> = env::args().collect();

    let config_path = parse_flag(&args, "--config")
        .ok_or_else(|| anyhow::anyhow!("missing required flag --config <path>"))?;
    let mut config = SimConfig::load(&config_path)?;

    if let Some(seed_str) = parse_flag(&args, "--seed") {
        config.seed = seed_str
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid --seed {seed_str:?}: {e}"))?;
    }

    info!(config = %config_path, seed = config.seed, "loading pool distribution");
    let distribution = PoolDistribution::load(&config.distributions_path)?;

    let mut simulation = Simulation::new(config, &distribution)?;

    info!("running simulation");
    let outcome = simulation.run()?;

    info!(
        matched_pairs = outcome.matched_pairs.len(),
        expired_pairs = outcome.expired_pairs.len(),
        left_pairs = outcome.left_pairs.len(),
        "run complete"
    );

    let json = serde_json::to_string_pretty(&outcome.statistics)?;
    match parse_flag(&args, "--out") {
        Some(out_path) => {
            fs::write(&out_path, json)?;
            info!(path = %out_path, "wrote statistics");
        }
        None => println!("{json}"),
    }

    Ok(())
}
