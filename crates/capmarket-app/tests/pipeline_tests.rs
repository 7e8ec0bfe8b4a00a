// Integration tests for a full free-agency run.
//
// These drive the public API end to end: CSV fixtures and a model file are
// loaded, the need matrix is built, the auction runs, outputs are written,
// and the run is read back from SQLite.

use std::path::{Path, PathBuf};

use capmarket_app::config::{AuctionSection, Config, DataPaths, MarketConfig, OutputConfig};
use capmarket_app::db::Database;
use capmarket_app::pipeline;
use capmarket_engine::auction::engine::TeamOrder;
use capmarket_engine::data::LoadError;

// ===========================================================================
// Test helpers
// ===========================================================================

/// Fixture directory path (relative to the crate root, which is the cwd for
/// `cargo test`).
const FIXTURES: &str = "tests/fixtures";

fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

/// Fresh output directory under the system temp dir.
fn temp_output(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(name);
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// Config pointing at the fixtures, with a given free-agent file, round
/// count, and output directory.
fn fixture_config(free_agents: &str, rounds: usize, output: &Path) -> Config {
    Config {
        market: MarketConfig {
            name: "Fixture Market".into(),
            season: Some(2024),
            default_position: "HB".into(),
            default_cap: 0.0,
        },
        auction: AuctionSection {
            scaling_factor: 1.0,
            bid_war_premium: 0.1,
            team_order: TeamOrder::Dataset,
            rounds,
        },
        data_paths: DataPaths {
            free_agents: format!("{FIXTURES}/{free_agents}"),
            teams: format!("{FIXTURES}/teams.csv"),
            model: format!("{FIXTURES}/model.toml"),
        },
        output: OutputConfig {
            directory: output.display().to_string(),
            top_matches: 3,
        },
        db_path: ":memory:".into(),
    }
}

fn base_dir() -> PathBuf {
    std::env::current_dir().unwrap()
}

// ===========================================================================
// Tests
// ===========================================================================

#[test]
fn season_filter_applies_to_both_tables() {
    let out = temp_output("capmarket_it_season");
    let config = fixture_config("free_agents.csv", 1, &out);

    let inputs = pipeline::load_inputs(&config, &base_dir()).unwrap();
    let players: Vec<&str> = inputs.free_agents.iter().map(|p| p.name.as_str()).collect();
    let teams: Vec<&str> = inputs.teams.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(players, vec!["X", "Y"]);
    assert_eq!(teams, vec!["A", "B"]);
}

#[test]
fn full_run_signs_expected_players_and_persists() {
    let out = temp_output("capmarket_it_full_run");
    let config = fixture_config("free_agents.csv", 1, &out);
    let db = Database::open(":memory:").unwrap();

    let summary = pipeline::run(&config, &base_dir(), &db).unwrap();
    assert_eq!(summary.free_agents, 2);
    assert_eq!(summary.teams, 2);

    // Wins are best HB / 10. Raw gains: X-A 3.0, X-B 2.0, Y-A 2.5, Y-B 1.5;
    // shifted by 1.5 they become 1.5, 0.5, 1.0, 0.0.
    assert_eq!(summary.top_matches.len(), 3);
    assert_eq!(summary.top_matches[0].player, "X");
    assert_eq!(summary.top_matches[0].team, "A");
    assert!(approx_eq(summary.top_matches[0].need, 1.5, 1e-9));

    let round = &summary.outcome.rounds[0];
    assert!(approx_eq(round.shift, 1.5, 1e-9));
    assert_eq!(round.auction.waves, 1);

    // A nominates X and outbids B: 1.5 + 0.1 * 0.5. B is left alone with Y.
    let signings = &round.auction.signings;
    assert_eq!(signings.len(), 2);
    assert_eq!((signings[0].team.as_str(), signings[0].player.as_str()), ("A", "X"));
    assert!(approx_eq(signings[0].price, 1.55, 1e-9));
    assert_eq!((signings[1].team.as_str(), signings[1].player.as_str()), ("B", "Y"));
    assert!(approx_eq(signings[1].price, 0.0, 1e-9));
    assert!(summary.outcome.unsigned.is_empty());

    // Stored run matches the in-memory outcome
    assert_eq!(db.latest_run_id().unwrap().as_deref(), Some(summary.run_id.as_str()));
    let stored = db.load_signings(&summary.run_id).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].round, 1);
    assert_eq!(&stored[0].signing, &signings[0]);

    let caps = db.load_caps(&summary.run_id).unwrap();
    assert_eq!(caps.len(), 2);
    assert!(approx_eq(caps[0].remaining, 98.45, 1e-9));
    assert!(approx_eq(caps[1].remaining, 100.0, 1e-9));

    let _ = std::fs::remove_dir_all(&out);
}

#[test]
fn run_writes_output_files() {
    let out = temp_output("capmarket_it_outputs");
    let config = fixture_config("free_agents.csv", 1, &out);
    let db = Database::open(":memory:").unwrap();

    let summary = pipeline::run(&config, &base_dir(), &db).unwrap();
    assert_eq!(summary.output_files.len(), 3);
    for path in &summary.output_files {
        assert!(path.exists(), "missing output {}", path.display());
    }

    let signings = std::fs::read_to_string(out.join("signings.csv")).unwrap();
    let mut lines = signings.lines();
    assert_eq!(lines.next(), Some("team,player,price,wave,nominated_by"));
    assert!(lines.next().unwrap().starts_with("A,X,"));
    assert_eq!(lines.next(), Some("B,Y,0.0,1,B"));

    // One evaluation per (player, team) pair
    let evaluations = std::fs::read_to_string(out.join("evaluations.csv")).unwrap();
    assert_eq!(evaluations.lines().count(), 1 + 4);

    let json = std::fs::read_to_string(out.join("outcome.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["rounds"].as_array().unwrap().len(), 1);

    let _ = std::fs::remove_dir_all(&out);
}

#[test]
fn extra_rounds_stop_once_everyone_is_signed() {
    let out = temp_output("capmarket_it_rounds");
    let config = fixture_config("free_agents.csv", 3, &out);
    let db = Database::open(":memory:").unwrap();

    let summary = pipeline::run(&config, &base_dir(), &db).unwrap();
    assert_eq!(summary.outcome.rounds.len(), 1);
    assert_eq!(summary.outcome.signing_count(), 2);

    // Signed players join the rosters
    let a = &summary.outcome.teams[0];
    assert_eq!(a.roster.best_rating("HB"), Some(90.0));

    let _ = std::fs::remove_dir_all(&out);
}

#[test]
fn duplicate_free_agents_are_rejected() {
    let out = temp_output("capmarket_it_duplicates");
    let config = fixture_config("duplicate_free_agents.csv", 1, &out);

    let err = pipeline::load_inputs(&config, &base_dir()).unwrap_err();
    match err.downcast_ref::<LoadError>() {
        Some(LoadError::Validation(message)) => assert!(message.contains("duplicate")),
        other => panic!("expected LoadError::Validation, got: {other:?}"),
    }
}

#[test]
fn missing_input_file_is_an_io_error() {
    let out = temp_output("capmarket_it_missing");
    let config = fixture_config("does_not_exist.csv", 1, &out);

    let err = pipeline::load_inputs(&config, &base_dir()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LoadError>(),
        Some(LoadError::Io { .. })
    ));
    assert!(format!("{err:#}").contains("failed to load free agents"));
}
