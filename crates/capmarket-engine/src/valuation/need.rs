// Need matrix: how many wins each free agent adds to each team.
//
// For every (player, team) pair the player is swapped into the team's
// roster at his position (replacing the weakest incumbent if he is better)
// and the predicted win total is compared against the team's baseline.
// After the whole matrix is filled, every cell is shifted by the global
// minimum so the smallest need is exactly 0: the auction spends need
// scores as currency and negative currency cannot be bid.
//
// The matrix is stored densely and never resized. Signing a player or
// retiring a team flips a membership flag, so row/column indices stay
// stable for the lifetime of an auction.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::market::roster::{Player, Team};
use crate::valuation::predictor::WinPredictor;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NeedError {
    #[error("no {what} supplied")]
    EmptyInput { what: &'static str },

    #[error("unknown player: {0}")]
    UnknownPlayer(String),

    #[error("unknown team: {0}")]
    UnknownTeam(String),

    #[error("player listed twice: {0}")]
    DuplicatePlayer(String),

    #[error("team listed twice: {0}")]
    DuplicateTeam(String),

    #[error("need matrix shape mismatch: expected {expected} cells, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("need score for ({player}, {team}) is not finite")]
    NonFiniteNeed { player: String, team: String },

    #[error("need score for ({player}, {team}) is negative: {value}")]
    NegativeNeed {
        player: String,
        team: String,
        value: f64,
    },

    #[error("predictor returned a non-finite win total for team {team}")]
    NonFinitePrediction { team: String },
}

/// Raw evaluation of one free agent against one team, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeedEvaluation {
    pub player_name: String,
    pub player_rating: f64,
    pub team_name: String,
    pub current_wins: f64,
    pub projected_wins: f64,
    pub win_improvement: f64,
}

/// A single (player, team) cell, used for ranked reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeedMatch {
    pub player: String,
    pub team: String,
    pub need: f64,
}

/// Dense player-by-team need scores with live membership tracking.
#[derive(Debug, Clone, Serialize)]
pub struct NeedMatrix {
    players: Vec<String>,
    teams: Vec<String>,
    /// Row-major: `cells[row * teams.len() + col]`.
    cells: Vec<f64>,
    active_players: Vec<bool>,
    active_teams: Vec<bool>,
    /// Amount subtracted from every raw cell during normalization.
    shift: f64,
    evaluations: Vec<NeedEvaluation>,
    #[serde(skip)]
    player_index: HashMap<String, usize>,
    #[serde(skip)]
    team_index: HashMap<String, usize>,
}

impl NeedMatrix {
    /// Build the normalized need matrix for every free agent and team.
    ///
    /// Players already signed (`free_agent == false`) are left out. The
    /// predictor is assumed pure: a player who would not make a team's
    /// roster scores the team's baseline without another prediction.
    pub fn build<P>(free_agents: &[Player], teams: &[Team], predictor: &P) -> Result<Self, NeedError>
    where
        P: WinPredictor + ?Sized,
    {
        let agents: Vec<&Player> = free_agents.iter().filter(|p| p.free_agent).collect();
        if agents.is_empty() {
            return Err(NeedError::EmptyInput { what: "free agents" });
        }
        if teams.is_empty() {
            return Err(NeedError::EmptyInput { what: "teams" });
        }

        let mut baselines = Vec::with_capacity(teams.len());
        for team in teams {
            let wins = predictor.predict_wins(&team.roster);
            if !wins.is_finite() {
                return Err(NeedError::NonFinitePrediction {
                    team: team.name.clone(),
                });
            }
            baselines.push(wins);
        }

        let mut cells = Vec::with_capacity(agents.len() * teams.len());
        let mut evaluations = Vec::with_capacity(agents.len() * teams.len());

        for player in &agents {
            for (team, &current_wins) in teams.iter().zip(&baselines) {
                let projected_wins = match team.roster.with_signing(&player.position, player.rating) {
                    Some(roster) => {
                        let wins = predictor.predict_wins(&roster);
                        if !wins.is_finite() {
                            return Err(NeedError::NonFinitePrediction {
                                team: team.name.clone(),
                            });
                        }
                        wins
                    }
                    None => current_wins,
                };

                let win_improvement = projected_wins - current_wins;
                cells.push(win_improvement);
                evaluations.push(NeedEvaluation {
                    player_name: player.name.clone(),
                    player_rating: player.rating,
                    team_name: team.name.clone(),
                    current_wins,
                    projected_wins,
                    win_improvement,
                });
            }
            debug!("Evaluated free agent {} against {} teams", player.name, teams.len());
        }

        let player_names: Vec<String> = agents.iter().map(|p| p.name.clone()).collect();
        let team_names: Vec<String> = teams.iter().map(|t| t.name.clone()).collect();
        let mut matrix = Self::assemble(player_names, team_names, cells)?;
        matrix.evaluations = evaluations;
        matrix.normalize();

        info!(
            "Built need matrix: {} players x {} teams, shifted by {:.3}",
            matrix.players.len(),
            matrix.teams.len(),
            matrix.shift
        );
        Ok(matrix)
    }

    /// Wrap precomputed, already normalized cells (row-major, players by
    /// teams). Every cell must be finite and non-negative.
    pub fn from_rows(
        players: Vec<String>,
        teams: Vec<String>,
        cells: Vec<f64>,
    ) -> Result<Self, NeedError> {
        let matrix = Self::assemble(players, teams, cells)?;
        let width = matrix.teams.len();
        if let Some(i) = matrix.cells.iter().position(|&v| v < 0.0) {
            return Err(NeedError::NegativeNeed {
                player: matrix.players[i / width].clone(),
                team: matrix.teams[i % width].clone(),
                value: matrix.cells[i],
            });
        }
        Ok(matrix)
    }

    /// Index raw cells without normalizing them. Negative cells are allowed
    /// here since `build` shifts them afterwards.
    fn assemble(
        players: Vec<String>,
        teams: Vec<String>,
        cells: Vec<f64>,
    ) -> Result<Self, NeedError> {
        let expected = players.len() * teams.len();
        if cells.len() != expected {
            return Err(NeedError::ShapeMismatch {
                expected,
                actual: cells.len(),
            });
        }

        let mut player_index = HashMap::with_capacity(players.len());
        for (i, name) in players.iter().enumerate() {
            if player_index.insert(name.clone(), i).is_some() {
                return Err(NeedError::DuplicatePlayer(name.clone()));
            }
        }
        let mut team_index = HashMap::with_capacity(teams.len());
        for (i, name) in teams.iter().enumerate() {
            if team_index.insert(name.clone(), i).is_some() {
                return Err(NeedError::DuplicateTeam(name.clone()));
            }
        }

        let width = teams.len();
        for (i, value) in cells.iter().enumerate() {
            if !value.is_finite() {
                return Err(NeedError::NonFiniteNeed {
                    player: players[i / width].clone(),
                    team: teams[i % width].clone(),
                });
            }
        }

        Ok(NeedMatrix {
            active_players: vec![true; players.len()],
            active_teams: vec![true; teams.len()],
            players,
            teams,
            cells,
            shift: 0.0,
            evaluations: Vec::new(),
            player_index,
            team_index,
        })
    }

    /// Shift every cell so the minimum is exactly 0. A uniform matrix
    /// becomes all zeros.
    fn normalize(&mut self) {
        let min = self
            .cells
            .iter()
            .copied()
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
            .unwrap_or(0.0);
        for cell in &mut self.cells {
            *cell -= min;
        }
        self.shift = min;
    }

    // -----------------------------------------------------------------------
    // Name-based accessors
    // -----------------------------------------------------------------------

    /// Need score of `player` for `team`.
    pub fn need(&self, player: &str, team: &str) -> Result<f64, NeedError> {
        let row = self.player_row(player)?;
        let col = self.team_col(team)?;
        Ok(self.value(row, col))
    }

    pub fn players(&self) -> &[String] {
        &self.players
    }

    pub fn teams(&self) -> &[String] {
        &self.teams
    }

    pub fn shift(&self) -> f64 {
        self.shift
    }

    /// Raw per-pair evaluations recorded by `build` (empty for matrices
    /// created with `from_rows`).
    pub fn evaluations(&self) -> &[NeedEvaluation] {
        &self.evaluations
    }

    pub fn has_player(&self, player: &str) -> bool {
        self.player_index
            .get(player)
            .is_some_and(|&row| self.active_players[row])
    }

    pub fn has_team(&self, team: &str) -> bool {
        self.team_index
            .get(team)
            .is_some_and(|&col| self.active_teams[col])
    }

    /// Drop a player's row from consideration.
    pub fn remove_player(&mut self, player: &str) -> Result<(), NeedError> {
        let row = self.player_row(player)?;
        self.active_players[row] = false;
        Ok(())
    }

    /// Drop a team's column from consideration.
    pub fn remove_team(&mut self, team: &str) -> Result<(), NeedError> {
        let col = self.team_col(team)?;
        self.active_teams[col] = false;
        Ok(())
    }

    /// Players still in the matrix, in dataset order.
    pub fn remaining_players(&self) -> Vec<&str> {
        self.players
            .iter()
            .zip(&self.active_players)
            .filter(|(_, &active)| active)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Teams still in the matrix, in dataset order.
    pub fn remaining_teams(&self) -> Vec<&str> {
        self.teams
            .iter()
            .zip(&self.active_teams)
            .filter(|(_, &active)| active)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// True when no player or no team remains.
    pub fn is_exhausted(&self) -> bool {
        !self.active_players.iter().any(|&a| a) || !self.active_teams.iter().any(|&a| a)
    }

    /// The remaining player with the highest need for `team`, with that
    /// need. Ties go to the earlier player in dataset order.
    pub fn best_player_for(&self, team: &str) -> Result<Option<(&str, f64)>, NeedError> {
        let col = self.team_col(team)?;
        Ok(self
            .best_row_for(col)
            .map(|row| (self.players[row].as_str(), self.value(row, col))))
    }

    /// The `n` highest remaining cells, descending. Ties keep row-major
    /// order.
    pub fn top_matches(&self, n: usize) -> Vec<NeedMatch> {
        let mut matches: Vec<NeedMatch> = Vec::new();
        for (row, player) in self.players.iter().enumerate() {
            if !self.active_players[row] {
                continue;
            }
            for (col, team) in self.teams.iter().enumerate() {
                if !self.active_teams[col] {
                    continue;
                }
                matches.push(NeedMatch {
                    player: player.clone(),
                    team: team.clone(),
                    need: self.value(row, col),
                });
            }
        }
        matches.sort_by(|a, b| b.need.partial_cmp(&a.need).unwrap_or(Ordering::Equal));
        matches.truncate(n);
        matches
    }

    // -----------------------------------------------------------------------
    // Index-based accessors for the auction engine
    // -----------------------------------------------------------------------

    fn player_row(&self, player: &str) -> Result<usize, NeedError> {
        self.player_index
            .get(player)
            .copied()
            .ok_or_else(|| NeedError::UnknownPlayer(player.to_string()))
    }

    fn team_col(&self, team: &str) -> Result<usize, NeedError> {
        self.team_index
            .get(team)
            .copied()
            .ok_or_else(|| NeedError::UnknownTeam(team.to_string()))
    }

    pub(crate) fn value(&self, row: usize, col: usize) -> f64 {
        self.cells[row * self.teams.len() + col]
    }

    pub(crate) fn player_name(&self, row: usize) -> &str {
        &self.players[row]
    }

    pub(crate) fn team_name(&self, col: usize) -> &str {
        &self.teams[col]
    }

    pub(crate) fn team_count(&self) -> usize {
        self.teams.len()
    }

    pub(crate) fn is_team_active(&self, col: usize) -> bool {
        self.active_teams[col]
    }

    pub(crate) fn deactivate_player(&mut self, row: usize) {
        self.active_players[row] = false;
    }

    pub(crate) fn deactivate_team(&mut self, col: usize) {
        self.active_teams[col] = false;
    }

    /// Argmax over the remaining rows of a column; first row wins ties.
    pub(crate) fn best_row_for(&self, col: usize) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for row in 0..self.players.len() {
            if !self.active_players[row] {
                continue;
            }
            let value = self.value(row, col);
            match best {
                Some((_, top)) if value <= top => {}
                _ => best = Some((row, value)),
            }
        }
        best.map(|(row, _)| row)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
