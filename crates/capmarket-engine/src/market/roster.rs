// Players, teams, and per-position rating slots.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A player on the free-agent market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Player name, unique within a season.
    pub name: String,
    /// Position abbreviation (e.g., "HB", "WR").
    pub position: String,
    /// Scalar skill rating (e.g., Madden overall).
    pub rating: f64,
    /// Whether the player is still unsigned.
    pub free_agent: bool,
}

impl Player {
    /// Create an unsigned free agent.
    pub fn new(name: &str, position: &str, rating: f64) -> Self {
        Player {
            name: name.to_string(),
            position: normalize_position(position),
            rating,
            free_agent: true,
        }
    }
}

/// The rating slots a team holds at one position, e.g. HB1..HB3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSlots {
    pub position: String,
    /// Ratings in slot order: index 0 is `<position>1`.
    pub ratings: Vec<f64>,
}

impl PositionSlots {
    /// The weakest incumbent rating, if any slot is filled.
    pub fn weakest(&self) -> Option<f64> {
        self.ratings
            .iter()
            .copied()
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
    }

    /// Feature name for a 0-based slot index (`HB` + 0 -> `HB1`).
    pub fn slot_name(&self, idx: usize) -> String {
        format!("{}{}", self.position, idx + 1)
    }
}

/// A team's roster expressed as ordered rating slots per position.
///
/// This is the only input a win predictor sees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosterState {
    pub positions: Vec<PositionSlots>,
}

impl RosterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rating to the given position, creating the position group
    /// at the end of the roster if it does not exist yet.
    pub fn push_rating(&mut self, position: &str, rating: f64) {
        let position = normalize_position(position);
        match self.positions.iter_mut().find(|p| p.position == position) {
            Some(group) => group.ratings.push(rating),
            None => self.positions.push(PositionSlots {
                position,
                ratings: vec![rating],
            }),
        }
    }

    /// Look up the slots held at a position.
    pub fn slots(&self, position: &str) -> Option<&PositionSlots> {
        let position = normalize_position(position);
        self.positions.iter().find(|p| p.position == position)
    }

    /// Best rating held at a position.
    pub fn best_rating(&self, position: &str) -> Option<f64> {
        self.slots(position).and_then(|group| {
            group
                .ratings
                .iter()
                .copied()
                .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        })
    }

    /// Total number of filled rating slots across all positions.
    pub fn slot_count(&self) -> usize {
        self.positions.iter().map(|p| p.ratings.len()).sum()
    }

    /// Flatten the roster into `(slot_name, rating)` pairs in roster order.
    pub fn features(&self) -> Vec<(String, f64)> {
        self.positions
            .iter()
            .flat_map(|group| {
                group
                    .ratings
                    .iter()
                    .enumerate()
                    .map(move |(i, &r)| (group.slot_name(i), r))
            })
            .collect()
    }

    /// The roster that would result from signing a player with `rating` at
    /// `position`, or `None` if the player would not make the roster.
    ///
    /// The team keeps its best N ratings at the position: when the player
    /// beats the weakest incumbent, the weakest is dropped and the group is
    /// re-sorted descending so slot 1 holds the best rating. A position the
    /// team has no incumbents at takes the player as a pure addition.
    pub fn with_signing(&self, position: &str, rating: f64) -> Option<RosterState> {
        let position = normalize_position(position);
        let mut next = self.clone();

        let Some(idx) = next.positions.iter().position(|p| p.position == position) else {
            next.positions.push(PositionSlots {
                position,
                ratings: vec![rating],
            });
            return Some(next);
        };
        let group = &mut next.positions[idx];

        let Some(weakest) = group.weakest() else {
            group.ratings.push(rating);
            return Some(next);
        };

        if rating <= weakest {
            return None;
        }

        group.ratings.push(rating);
        group
            .ratings
            .sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
        group.ratings.pop();
        Some(next)
    }
}

/// A team competing for free agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    pub roster: RosterState,
    /// Remaining salary cap available for bidding.
    pub cap: f64,
}

impl Team {
    pub fn new(name: &str, roster: RosterState, cap: f64) -> Self {
        Team {
            name: name.to_string(),
            roster,
            cap,
        }
    }

    /// Apply a completed signing: the player joins the roster under the
    /// usual replacement rule and the price comes out of the cap.
    ///
    /// Returns `true` if the roster changed.
    pub fn sign(&mut self, player: &Player, price: f64) -> bool {
        self.cap = (self.cap - price).max(0.0);
        match self.roster.with_signing(&player.position, player.rating) {
            Some(next) => {
                self.roster = next;
                true
            }
            None => false,
        }
    }
}

/// Canonical position key: trimmed and uppercased.
pub fn normalize_position(position: &str) -> String {
    position.trim().to_uppercase()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
