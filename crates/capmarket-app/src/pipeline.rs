// End-to-end run: input tables -> need matrix -> auction rounds -> outputs.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use capmarket_engine::auction::rounds::{FreeAgency, FreeAgencyOutcome};
use capmarket_engine::data;
use capmarket_engine::market::roster::{Player, Team};
use capmarket_engine::report;
use capmarket_engine::valuation::need::{NeedMatch, NeedMatrix};
use capmarket_engine::valuation::predictor::LinearWinPredictor;

use crate::config::Config;
use crate::db::{Database, RunMeta};

/// Everything the binary needs to report on a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub free_agents: usize,
    pub teams: usize,
    /// Highest needs before any signing.
    pub top_matches: Vec<NeedMatch>,
    pub outcome: FreeAgencyOutcome,
    pub output_files: Vec<PathBuf>,
}

/// Inputs read from disk for one run.
#[derive(Debug, Clone)]
pub struct MarketInputs {
    pub free_agents: Vec<Player>,
    pub teams: Vec<Team>,
    pub predictor: LinearWinPredictor,
}

/// Resolve a configured path against `base_dir` unless it is absolute.
fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Read the free agents, teams, and win model named in `config`.
pub fn load_inputs(config: &Config, base_dir: &Path) -> Result<MarketInputs> {
    let opts = config.load_options();

    let fa_path = resolve(base_dir, &config.data_paths.free_agents);
    let free_agents = data::load_free_agents(&fa_path, &opts)
        .with_context(|| format!("failed to load free agents from {}", fa_path.display()))?;

    let teams_path = resolve(base_dir, &config.data_paths.teams);
    let teams = data::load_teams(&teams_path, &opts)
        .with_context(|| format!("failed to load teams from {}", teams_path.display()))?;

    let model_path = resolve(base_dir, &config.data_paths.model);
    let predictor = LinearWinPredictor::load(&model_path).context("failed to load win model")?;

    info!(
        "Loaded {} free agents and {} teams (season {:?})",
        free_agents.len(),
        teams.len(),
        opts.season
    );

    Ok(MarketInputs {
        free_agents,
        teams,
        predictor,
    })
}

/// Run free agency over already-loaded inputs, write the output files, and
/// record the run in `db`.
pub fn run_with_inputs(
    config: &Config,
    base_dir: &Path,
    inputs: &MarketInputs,
    db: &Database,
) -> Result<RunSummary> {
    let run_id = Database::generate_run_id();

    let initial = NeedMatrix::build(&inputs.free_agents, &inputs.teams, &inputs.predictor)
        .context("failed to build need matrix")?;
    info!(
        "Need matrix: {} players x {} teams, shift {:.4}",
        initial.players().len(),
        initial.teams().len(),
        initial.shift()
    );
    let top_matches = initial.top_matches(config.output.top_matches);

    let agency = FreeAgency::new(&inputs.predictor, config.auction_config());
    let outcome = agency
        .run_rounds(&inputs.free_agents, &inputs.teams, config.auction.rounds)
        .context("auction failed")?;
    info!(
        "Run {}: {} signings over {} rounds, {} unsigned",
        run_id,
        outcome.signing_count(),
        outcome.rounds.len(),
        outcome.unsigned.len()
    );

    let output_dir = resolve(base_dir, &config.output.directory);
    let output_files = write_outputs(&output_dir, &initial, &outcome)?;

    let meta = RunMeta {
        market: config.market.name.clone(),
        season: config.market.season,
        scaling_factor: config.auction.scaling_factor,
    };
    db.record_run(&run_id, &meta, &outcome)
        .context("failed to record run")?;

    Ok(RunSummary {
        run_id,
        free_agents: inputs.free_agents.len(),
        teams: inputs.teams.len(),
        top_matches,
        outcome,
        output_files,
    })
}

/// Load inputs from disk and run free agency.
pub fn run(config: &Config, base_dir: &Path, db: &Database) -> Result<RunSummary> {
    let inputs = load_inputs(config, base_dir)?;
    run_with_inputs(config, base_dir, &inputs, db)
}

fn write_outputs(dir: &Path, initial: &NeedMatrix, outcome: &FreeAgencyOutcome) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;

    let signings: Vec<_> = outcome
        .rounds
        .iter()
        .flat_map(|r| r.auction.signings.iter().cloned())
        .collect();

    let signings_path = dir.join("signings.csv");
    let file = File::create(&signings_path)
        .with_context(|| format!("failed to create {}", signings_path.display()))?;
    report::write_signings_csv(file, &signings).context("failed to write signings")?;

    let evaluations_path = dir.join("evaluations.csv");
    let file = File::create(&evaluations_path)
        .with_context(|| format!("failed to create {}", evaluations_path.display()))?;
    report::write_evaluations_csv(file, initial.evaluations())
        .context("failed to write evaluations")?;

    let json_path = dir.join("outcome.json");
    let json = report::outcome_json(outcome).context("failed to serialize outcome")?;
    std::fs::write(&json_path, json)
        .with_context(|| format!("failed to write {}", json_path.display()))?;

    Ok(vec![signings_path, evaluations_path, json_path])
}
