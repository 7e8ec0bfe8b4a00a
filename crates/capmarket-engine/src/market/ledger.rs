// Salary-cap ledger: remaining budget per team, mutated as signings occur.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::roster::Team;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("unknown team: {0}")]
    UnknownTeam(String),

    #[error("team registered twice: {0}")]
    DuplicateTeam(String),

    #[error("invalid cap {cap} for team {team}")]
    InvalidCap { team: String, cap: f64 },

    #[error("invalid deduction {amount} for team {team}")]
    InvalidAmount { team: String, amount: f64 },

    #[error("team {team} cannot pay {requested}: only {available} remaining")]
    InsufficientCap {
        team: String,
        requested: f64,
        available: f64,
    },
}

/// Remaining cap for a single team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapEntry {
    pub team: String,
    pub remaining: f64,
}

/// Per-team remaining cap, kept in registration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapLedger {
    entries: Vec<CapEntry>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl CapLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from each team's current cap, in dataset order.
    pub fn from_teams(teams: &[Team]) -> Result<Self, LedgerError> {
        let mut ledger = CapLedger::new();
        for team in teams {
            ledger.register(&team.name, team.cap)?;
        }
        Ok(ledger)
    }

    /// Start tracking a team with the given budget.
    pub fn register(&mut self, team: &str, cap: f64) -> Result<(), LedgerError> {
        if self.index.contains_key(team) {
            return Err(LedgerError::DuplicateTeam(team.to_string()));
        }
        if !cap.is_finite() || cap < 0.0 {
            return Err(LedgerError::InvalidCap {
                team: team.to_string(),
                cap,
            });
        }
        self.index.insert(team.to_string(), self.entries.len());
        self.entries.push(CapEntry {
            team: team.to_string(),
            remaining: cap,
        });
        Ok(())
    }

    /// Current remaining budget for a team.
    pub fn get_cap(&self, team: &str) -> Result<f64, LedgerError> {
        self.index
            .get(team)
            .map(|&i| self.entries[i].remaining)
            .ok_or_else(|| LedgerError::UnknownTeam(team.to_string()))
    }

    pub fn contains(&self, team: &str) -> bool {
        self.index.contains_key(team)
    }

    /// Subtract `amount` from a team's budget.
    ///
    /// Bids are clamped to the bidder's cap before they get here, so an
    /// overdraw means the caller skipped that clamp.
    pub fn deduct(&mut self, team: &str, amount: f64) -> Result<f64, LedgerError> {
        let &i = self
            .index
            .get(team)
            .ok_or_else(|| LedgerError::UnknownTeam(team.to_string()))?;
        if !amount.is_finite() || amount < 0.0 {
            return Err(LedgerError::InvalidAmount {
                team: team.to_string(),
                amount,
            });
        }

        let entry = &mut self.entries[i];
        if amount > entry.remaining {
            return Err(LedgerError::InsufficientCap {
                team: team.to_string(),
                requested: amount,
                available: entry.remaining,
            });
        }

        entry.remaining -= amount;
        debug!(
            "Deducted {:.3} from {} ({:.3} remaining)",
            amount, team, entry.remaining
        );
        Ok(entry.remaining)
    }

    /// Per-team remaining cap in registration order.
    pub fn snapshot(&self) -> Vec<CapEntry> {
        self.entries.clone()
    }

    /// Sum of remaining cap across all teams.
    pub fn total_remaining(&self) -> f64 {
        self.entries.iter().map(|e| e.remaining).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::roster::RosterState;

    fn ledger(caps: &[(&str, f64)]) -> CapLedger {
        let mut l = CapLedger::new();
        for (team, cap) in caps {
            l.register(team, *cap).unwrap();
        }
        l
    }

    #[test]
    fn get_cap_returns_registered_budget() {
        let l = ledger(&[("Bears", 40.0), ("Lions", 12.5)]);
        assert_eq!(l.get_cap("Bears"), Ok(40.0));
        assert_eq!(l.get_cap("Lions"), Ok(12.5));
        assert_eq!(l.len(), 2);
    }

    #[test]
    fn get_cap_unknown_team_errors() {
        let l = ledger(&[("Bears", 40.0)]);
        assert_eq!(
            l.get_cap("Packers"),
            Err(LedgerError::UnknownTeam("Packers".into()))
        );
    }

    #[test]
    fn deduct_reduces_budget() {
        let mut l = ledger(&[("Bears", 40.0)]);
        assert_eq!(l.deduct("Bears", 15.0), Ok(25.0));
        assert_eq!(l.get_cap("Bears"), Ok(25.0));
    }

    #[test]
    fn deduct_entire_cap_leaves_zero() {
        let mut l = ledger(&[("Bears", 5.0)]);
        assert_eq!(l.deduct("Bears", 5.0), Ok(0.0));
    }

    #[test]
    fn deduct_more_than_cap_errors_and_leaves_budget() {
        let mut l = ledger(&[("Bears", 5.0)]);
        let err = l.deduct("Bears", 5.5).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientCap { .. }));
        assert_eq!(l.get_cap("Bears"), Ok(5.0));
    }

    #[test]
    fn deduct_rejects_negative_amount() {
        let mut l = ledger(&[("Bears", 5.0)]);
        assert!(matches!(
            l.deduct("Bears", -1.0),
            Err(LedgerError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn register_rejects_duplicates_and_bad_caps() {
        let mut l = ledger(&[("Bears", 5.0)]);
        assert_eq!(
            l.register("Bears", 1.0),
            Err(LedgerError::DuplicateTeam("Bears".into()))
        );
        assert!(matches!(
            l.register("Jets", -3.0),
            Err(LedgerError::InvalidCap { .. })
        ));
        assert!(matches!(
            l.register("Jets", f64::NAN),
            Err(LedgerError::InvalidCap { .. })
        ));
    }

    #[test]
    fn snapshot_keeps_registration_order() {
        let mut l = ledger(&[("Vikings", 10.0), ("Bears", 20.0), ("Lions", 30.0)]);
        l.deduct("Bears", 5.0).unwrap();
        let snap = l.snapshot();
        let names: Vec<&str> = snap.iter().map(|e| e.team.as_str()).collect();
        assert_eq!(names, vec!["Vikings", "Bears", "Lions"]);
        assert_eq!(snap[1].remaining, 15.0);
        assert!((l.total_remaining() - 55.0).abs() < 1e-9);
    }

    #[test]
    fn from_teams_uses_team_caps() {
        let teams = vec![
            Team::new("Cowboys", RosterState::new(), 18.0),
            Team::new("Commanders", RosterState::new(), 22.0),
        ];
        let l = CapLedger::from_teams(&teams).unwrap();
        assert_eq!(l.get_cap("Commanders"), Ok(22.0));
    }
}
