// Plain-text and file exports of auction results.

use std::io::Write;

use serde::Serialize;

use crate::auction::engine::SigningRecord;
use crate::auction::rounds::FreeAgencyOutcome;
use crate::market::ledger::CapEntry;
use crate::valuation::need::{NeedEvaluation, NeedMatch};

// ---------------------------------------------------------------------------
// Text tables
// ---------------------------------------------------------------------------

fn name_width<'a>(names: impl Iterator<Item = &'a str>, header: &str) -> usize {
    names.map(|n| n.chars().count()).max().unwrap_or(0).max(header.len())
}

/// Render signings as an aligned table, one row per signing.
pub fn render_signings(signings: &[SigningRecord]) -> String {
    if signings.is_empty() {
        return "No signings.\n".to_string();
    }

    let tw = name_width(signings.iter().map(|s| s.team.as_str()), "Team");
    let pw = name_width(signings.iter().map(|s| s.player.as_str()), "Player");

    let mut out = format!(
        "{:>4}  {:>4}  {:<tw$}  {:<pw$}  {:>8}\n",
        "Pick", "Wave", "Team", "Player", "Price"
    );
    for s in signings {
        out.push_str(&format!(
            "{:>4}  {:>4}  {:<tw$}  {:<pw$}  {:>8.3}\n",
            s.pick, s.wave, s.team, s.player, s.price
        ));
    }
    out
}

/// Render each team's remaining cap.
pub fn render_caps(caps: &[CapEntry]) -> String {
    let tw = name_width(caps.iter().map(|c| c.team.as_str()), "Team");
    let mut out = format!("{:<tw$}  {:>10}\n", "Team", "Remaining");
    for c in caps {
        out.push_str(&format!("{:<tw$}  {:>10.3}\n", c.team, c.remaining));
    }
    out
}

/// Render the highest-need (player, team) pairs.
pub fn render_top_matches(matches: &[NeedMatch]) -> String {
    if matches.is_empty() {
        return "No remaining matches.\n".to_string();
    }

    let pw = name_width(matches.iter().map(|m| m.player.as_str()), "Player");
    let tw = name_width(matches.iter().map(|m| m.team.as_str()), "Team");
    let mut out = format!("{:<pw$}  {:<tw$}  {:>8}\n", "Player", "Team", "Need");
    for m in matches {
        out.push_str(&format!("{:<pw$}  {:<tw$}  {:>8.3}\n", m.player, m.team, m.need));
    }
    out
}

// ---------------------------------------------------------------------------
// CSV / JSON exports
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SigningRow<'a> {
    team: &'a str,
    player: &'a str,
    price: f64,
    wave: usize,
    nominated_by: &'a str,
}

/// Write signings as CSV with columns `team,player,price,wave,nominated_by`.
pub fn write_signings_csv<W: Write>(writer: W, signings: &[SigningRecord]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    if signings.is_empty() {
        wtr.write_record(["team", "player", "price", "wave", "nominated_by"])?;
    }
    for s in signings {
        wtr.serialize(SigningRow {
            team: &s.team,
            player: &s.player,
            price: s.price,
            wave: s.wave,
            nominated_by: &s.nominated_by,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write per-pair win evaluations as CSV.
pub fn write_evaluations_csv<W: Write>(
    writer: W,
    evaluations: &[NeedEvaluation],
) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    if evaluations.is_empty() {
        wtr.write_record([
            "player_name",
            "player_rating",
            "team_name",
            "current_wins",
            "projected_wins",
            "win_improvement",
        ])?;
    }
    for e in evaluations {
        wtr.serialize(e)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Serialize a full free-agency run as pretty JSON.
pub fn outcome_json(outcome: &FreeAgencyOutcome) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(outcome)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
