// Multi-round free agency.
//
// A single auction run lets each team sign at most one player. To fill
// more of the market, the run is repeated: after each round the winning
// teams' rosters and caps are updated, signed players leave the pool, and
// the need matrix is rebuilt against the new rosters.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::auction::engine::{AuctionConfig, AuctionEngine, AuctionError, AuctionOutcome};
use crate::market::ledger::{CapLedger, LedgerError};
use crate::market::roster::{Player, Team};
use crate::valuation::need::{NeedError, NeedMatrix};
use crate::valuation::predictor::WinPredictor;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FreeAgencyError {
    #[error("need matrix: {0}")]
    Need(#[from] NeedError),

    #[error("cap ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("auction: {0}")]
    Auction(#[from] AuctionError),

    #[error("inconsistent free agency state: {0}")]
    InconsistentState(String),
}

/// One auction round together with the matrix it ran on.
#[derive(Debug, Clone, Serialize)]
pub struct RoundOutcome {
    /// 1-based round number.
    pub round: usize,
    /// Normalization shift of this round's need matrix.
    pub shift: f64,
    pub auction: AuctionOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct FreeAgencyOutcome {
    pub rounds: Vec<RoundOutcome>,
    /// Teams after every signing was applied.
    pub teams: Vec<Team>,
    /// Free agents nobody signed.
    pub unsigned: Vec<Player>,
}

impl FreeAgencyOutcome {
    pub fn signing_count(&self) -> usize {
        self.rounds.iter().map(|r| r.auction.signings.len()).sum()
    }
}

/// Drives repeated auction rounds over a shared player pool.
pub struct FreeAgency<'a, P: WinPredictor + ?Sized> {
    predictor: &'a P,
    engine: AuctionEngine,
}

impl<'a, P: WinPredictor + ?Sized> FreeAgency<'a, P> {
    pub fn new(predictor: &'a P, config: AuctionConfig) -> Self {
        FreeAgency {
            predictor,
            engine: AuctionEngine::new(config),
        }
    }

    /// Run up to `rounds` auction rounds.
    ///
    /// Stops early once every free agent is signed, no team has cap left,
    /// or a round signs nobody. The first round always runs, even when
    /// every cap is zero. From the second round on only teams with cap
    /// left take part.
    pub fn run_rounds(
        &self,
        free_agents: &[Player],
        teams: &[Team],
        rounds: usize,
    ) -> Result<FreeAgencyOutcome, FreeAgencyError> {
        let mut players = free_agents.to_vec();
        let mut teams = teams.to_vec();
        let mut outcomes = Vec::new();

        for round in 1..=rounds.max(1) {
            if round > 1 {
                if !players.iter().any(|p| p.free_agent) {
                    info!("All free agents signed after {} rounds", round - 1);
                    break;
                }
                if !teams.iter().any(|t| t.cap > 0.0) {
                    info!("No team has cap left after {} rounds", round - 1);
                    break;
                }
            }

            let bidders: Vec<Team> = if round == 1 {
                teams.clone()
            } else {
                teams.iter().filter(|t| t.cap > 0.0).cloned().collect()
            };
            if bidders.len() < teams.len() {
                debug!(
                    "Round {}: {} teams sit out with no cap left",
                    round,
                    teams.len() - bidders.len()
                );
            }

            let matrix = NeedMatrix::build(&players, &bidders, self.predictor)?;
            let shift = matrix.shift();
            let ledger = CapLedger::from_teams(&bidders)?;
            let auction = self.engine.run(matrix, ledger)?;

            apply_signings(&auction, &mut players, &mut teams)?;
            info!(
                "Round {}: {} signings, {} free agents left",
                round,
                auction.signings.len(),
                players.iter().filter(|p| p.free_agent).count()
            );

            let signed_any = !auction.signings.is_empty();
            outcomes.push(RoundOutcome {
                round,
                shift,
                auction,
            });
            if !signed_any {
                break;
            }
        }

        let unsigned = players.into_iter().filter(|p| p.free_agent).collect();
        Ok(FreeAgencyOutcome {
            rounds: outcomes,
            teams,
            unsigned,
        })
    }
}

/// Fold an auction's signings back into the player pool and team states.
///
/// Every signing must name a free agent still in `players` and a team in
/// `teams`; nothing is applied otherwise.
pub fn apply_signings(
    outcome: &AuctionOutcome,
    players: &mut [Player],
    teams: &mut [Team],
) -> Result<(), FreeAgencyError> {
    let mut resolved = Vec::with_capacity(outcome.signings.len());
    for signing in &outcome.signings {
        let player_idx = players
            .iter()
            .position(|p| p.name == signing.player && p.free_agent)
            .ok_or_else(|| {
                FreeAgencyError::InconsistentState(format!(
                    "signed player {} is not an available free agent",
                    signing.player
                ))
            })?;
        let team_idx = teams
            .iter()
            .position(|t| t.name == signing.team)
            .ok_or_else(|| {
                FreeAgencyError::InconsistentState(format!(
                    "signing team {} is not in the market",
                    signing.team
                ))
            })?;
        resolved.push((player_idx, team_idx, signing.price));
    }

    for (player_idx, team_idx, price) in resolved {
        let player = &mut players[player_idx];
        player.free_agent = false;
        teams[team_idx].sign(player, price);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::roster::RosterState;

    fn hb_team(name: &str, rating: f64, cap: f64) -> Team {
        let mut roster = RosterState::new();
        roster.push_rating("HB", rating);
        Team::new(name, roster, cap)
    }

    fn best_hb(roster: &RosterState) -> f64 {
        roster.best_rating("HB").unwrap_or(0.0) / 10.0
    }

    #[test]
    fn single_round_matches_one_engine_run() {
        let players = vec![
            Player::new("P1", "HB", 90.0),
            Player::new("P2", "HB", 85.0),
            Player::new("P3", "HB", 80.0),
        ];
        let teams = vec![hb_team("A", 60.0, 10.0), hb_team("B", 70.0, 10.0)];

        let fa = FreeAgency::new(&best_hb, AuctionConfig::default());
        let out = fa.run_rounds(&players, &teams, 1).unwrap();

        assert_eq!(out.rounds.len(), 1);
        assert_eq!(out.signing_count(), 2);
        assert_eq!(out.unsigned.len(), 1);

        let direct = AuctionEngine::default()
            .run(
                NeedMatrix::build(&players, &teams, &best_hb).unwrap(),
                CapLedger::from_teams(&teams).unwrap(),
            )
            .unwrap();
        assert_eq!(out.rounds[0].auction.signings, direct.signings);
    }

    #[test]
    fn later_rounds_sign_remaining_players() {
        let players = vec![
            Player::new("P1", "HB", 90.0),
            Player::new("P2", "HB", 85.0),
            Player::new("P3", "HB", 80.0),
        ];
        let teams = vec![hb_team("A", 60.0, 10.0), hb_team("B", 70.0, 10.0)];

        let fa = FreeAgency::new(&best_hb, AuctionConfig::default());
        let out = fa.run_rounds(&players, &teams, 5).unwrap();

        // Round 2 signs the last player; round 3 has nobody left.
        assert_eq!(out.rounds.len(), 2);
        assert_eq!(out.signing_count(), 3);
        assert!(out.unsigned.is_empty());

        let mut seen = std::collections::HashSet::new();
        for r in &out.rounds {
            for s in &r.auction.signings {
                assert!(seen.insert(s.player.clone()), "{} signed twice", s.player);
            }
        }

        for team in &out.teams {
            assert!(team.cap >= 0.0);
            assert!(team.roster.best_rating("HB").unwrap() >= 80.0);
        }
    }

    #[test]
    fn stops_when_caps_are_exhausted() {
        let players = vec![Player::new("P1", "HB", 90.0), Player::new("P2", "HB", 85.0)];
        // Need for P1 is 0.5 after normalization; a 0.25 cap is fully spent.
        let teams = vec![hb_team("A", 60.0, 0.25)];

        let fa = FreeAgency::new(&best_hb, AuctionConfig::default());
        let out = fa.run_rounds(&players, &teams, 3).unwrap();

        assert_eq!(out.rounds.len(), 1);
        assert_eq!(out.teams[0].cap, 0.0);
        assert_eq!(out.unsigned.len(), 1);
    }

    #[test]
    fn apply_signings_updates_pool_and_rosters() {
        let mut players = vec![Player::new("P1", "HB", 90.0)];
        let mut teams = vec![hb_team("A", 60.0, 10.0)];
        let auction = AuctionEngine::default()
            .run(
                NeedMatrix::build(&players, &teams, &best_hb).unwrap(),
                CapLedger::from_teams(&teams).unwrap(),
            )
            .unwrap();

        apply_signings(&auction, &mut players, &mut teams).unwrap();

        assert!(!players[0].free_agent);
        assert_eq!(teams[0].roster.best_rating("HB"), Some(90.0));
        assert_eq!(teams[0].cap, 10.0 - auction.signings[0].price);
    }

    #[test]
    fn apply_signings_rejects_unknown_names() {
        let players = vec![Player::new("P1", "HB", 90.0)];
        let teams = vec![hb_team("A", 60.0, 10.0)];
        let auction = AuctionEngine::default()
            .run(
                NeedMatrix::build(&players, &teams, &best_hb).unwrap(),
                CapLedger::from_teams(&teams).unwrap(),
            )
            .unwrap();

        let mut other_players = vec![Player::new("Someone", "HB", 90.0)];
        let mut pool_teams = teams.clone();
        let err = apply_signings(&auction, &mut other_players, &mut pool_teams).unwrap_err();
        assert!(matches!(err, FreeAgencyError::InconsistentState(_)));
        assert!(other_players[0].free_agent);

        let mut pool_players = players.clone();
        let mut other_teams = vec![hb_team("Z", 60.0, 10.0)];
        let err = apply_signings(&auction, &mut pool_players, &mut other_teams).unwrap_err();
        assert!(matches!(err, FreeAgencyError::InconsistentState(_)));
        // Nothing is applied when any signing fails to resolve
        assert!(pool_players[0].free_agent);
        assert_eq!(other_teams[0].cap, 10.0);
    }

    #[test]
    fn team_out_of_cap_sits_out_later_rounds() {
        let players = vec![
            Player::new("P1", "HB", 90.0),
            Player::new("P2", "HB", 85.0),
            Player::new("P3", "HB", 80.0),
        ];
        let teams = vec![hb_team("A", 60.0, 1.0), hb_team("B", 70.0, 100.0)];

        let fa = FreeAgency::new(&best_hb, AuctionConfig::default());
        let out = fa.run_rounds(&players, &teams, 3).unwrap();

        let first = &out.rounds[0].auction.signings;
        assert_eq!((first[0].team.as_str(), first[0].player.as_str()), ("A", "P1"));
        assert_eq!(first[0].price, 1.0);

        // A spent its whole cap in round 1 and takes no part afterwards
        for r in &out.rounds[1..] {
            assert!(r.auction.signings.iter().all(|s| s.team != "A"), "{r:?}");
            assert!(r.auction.ledger.get_cap("A").is_err());
        }
        let a = out.teams.iter().find(|t| t.name == "A").unwrap();
        assert_eq!(a.cap, 0.0);
        assert_eq!(a.roster.best_rating("HB"), Some(90.0));

        // B still has cap and picks up P3 in round 2
        let later: Vec<&str> = out.rounds[1..]
            .iter()
            .flat_map(|r| r.auction.signings.iter().map(|s| s.player.as_str()))
            .collect();
        assert_eq!(later, vec!["P3"]);
        assert!(out.unsigned.is_empty());
    }
}
