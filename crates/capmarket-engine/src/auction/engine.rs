// Round-robin, cap-constrained free-agent auction.
//
// Each wave walks a frozen snapshot of the remaining teams. A team that is
// still unsigned nominates its highest-need remaining player; every team
// still in the matrix then bids `min(cap, need * scaling_factor)` for that
// player. The top bidder wins, paying its bid plus a premium of
// `bid_war_premium` times the runner-up bid, clamped to its own cap. The
// player and the winning team then leave the matrix: a team signs at most
// one free agent per run.
//
// The winner is not necessarily the nominating team. A team can lose the
// player it nominated to a rival that values him more, and then gets no
// second nomination in that wave.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::market::ledger::{CapEntry, CapLedger, LedgerError};
use crate::valuation::need::NeedMatrix;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Order in which teams nominate within a wave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamOrder {
    /// Order of the team columns in the input data.
    #[default]
    Dataset,
    /// Alphabetical by team name.
    Name,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionConfig {
    /// Multiplier turning need scores into bid dollars.
    pub scaling_factor: f64,
    /// Fraction of the runner-up bid the winner pays on top of its own bid.
    pub bid_war_premium: f64,
    /// Nomination order within a wave. Also breaks ties between equal bids:
    /// the team earlier in this order ranks first.
    pub team_order: TeamOrder,
}

impl AuctionConfig {
    /// Reject settings that would produce negative or undefined bids.
    pub fn validate(&self) -> Result<(), AuctionError> {
        if !self.scaling_factor.is_finite() || self.scaling_factor < 0.0 {
            return Err(AuctionError::InvalidConfig(format!(
                "scaling_factor must be a non-negative number, got {}",
                self.scaling_factor
            )));
        }
        if !self.bid_war_premium.is_finite() || self.bid_war_premium < 0.0 {
            return Err(AuctionError::InvalidConfig(format!(
                "bid_war_premium must be a non-negative number, got {}",
                self.bid_war_premium
            )));
        }
        Ok(())
    }
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            scaling_factor: 1.0,
            bid_war_premium: 0.1,
            team_order: TeamOrder::Dataset,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuctionError {
    #[error("invalid auction config: {0}")]
    InvalidConfig(String),

    #[error("inconsistent auction state: {0}")]
    InconsistentState(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// One completed signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningRecord {
    /// 1-based order of the signing within the run.
    pub pick: usize,
    /// 1-based wave the signing happened in.
    pub wave: usize,
    pub team: String,
    pub player: String,
    pub price: f64,
    /// Team whose need put the player up for auction.
    pub nominated_by: String,
    /// Winning team's need score for the player.
    pub need: f64,
}

/// A single team's bid for the player under auction.
#[derive(Debug, Clone, PartialEq)]
pub struct Bid {
    pub team: String,
    pub amount: f64,
    /// The team's cap when it bid.
    pub cap: f64,
    pub(crate) col: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuctionOutcome {
    pub signings: Vec<SigningRecord>,
    /// Ledger after every deduction.
    pub ledger: CapLedger,
    /// Waves that produced at least one signing.
    pub waves: usize,
    pub unsigned_players: Vec<String>,
    pub unsigned_teams: Vec<String>,
}

impl AuctionOutcome {
    pub fn final_caps(&self) -> Vec<CapEntry> {
        self.ledger.snapshot()
    }

    pub fn total_spent(&self) -> f64 {
        self.signings.iter().map(|s| s.price).sum()
    }
}

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// A team's bid: its scaled need, never more than it can pay.
pub fn bid_amount(need: f64, cap: f64, scaling_factor: f64) -> f64 {
    (need * scaling_factor).min(cap)
}

/// Price paid by the top bidder.
///
/// With a runner-up the price is `max(b1, b2) + premium * min(b1, b2)`,
/// clamped to the top bidder's cap. An uncontested bidder pays its own bid.
pub fn clearing_price(top: f64, runner_up: Option<f64>, top_cap: f64, premium: f64) -> f64 {
    match runner_up {
        Some(second) => (top.max(second) + premium * top.min(second)).min(top_cap),
        None => top,
    }
}

/// Sort bids descending by amount. The sort is stable, so equal bids keep
/// their input order.
pub fn rank_bids(bids: &mut [Bid]) {
    bids.sort_by(|a, b| b.amount.partial_cmp(&a.amount).unwrap_or(Ordering::Equal));
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct AuctionEngine {
    config: AuctionConfig,
}

impl AuctionEngine {
    pub fn new(config: AuctionConfig) -> Self {
        AuctionEngine { config }
    }

    pub fn config(&self) -> &AuctionConfig {
        &self.config
    }

    /// Run the auction to completion.
    ///
    /// Consumes the matrix and the ledger; the ledger comes back in the
    /// outcome with every price deducted. Stops when no player or no team
    /// remains, or when a whole wave signs nobody.
    pub fn run(&self, mut matrix: NeedMatrix, mut ledger: CapLedger) -> Result<AuctionOutcome, AuctionError> {
        self.config.validate()?;
        for team in matrix.remaining_teams() {
            if !ledger.contains(team) {
                return Err(AuctionError::InconsistentState(format!(
                    "team {team} is in the need matrix but has no cap entry"
                )));
            }
        }

        let order = self.nomination_order(&matrix);
        let mut signings: Vec<SigningRecord> = Vec::new();
        let mut waves = 0;

        while !matrix.is_exhausted() {
            let wave = waves + 1;
            let snapshot: Vec<usize> = order
                .iter()
                .copied()
                .filter(|&col| matrix.is_team_active(col))
                .collect();
            let mut signed_this_wave: HashSet<usize> = HashSet::new();

            for &nominator in &snapshot {
                if signed_this_wave.contains(&nominator) || !matrix.is_team_active(nominator) {
                    continue;
                }
                let Some(row) = matrix.best_row_for(nominator) else {
                    debug!(
                        "Wave {}: {} has no player left to nominate",
                        wave,
                        matrix.team_name(nominator)
                    );
                    continue;
                };

                let bidders: Vec<usize> = order
                    .iter()
                    .copied()
                    .filter(|&col| matrix.is_team_active(col))
                    .collect();
                let (winner_col, record) =
                    self.settle(&matrix, &mut ledger, row, nominator, &bidders, signings.len() + 1, wave)?;

                matrix.deactivate_player(row);
                matrix.deactivate_team(winner_col);
                signed_this_wave.insert(winner_col);
                signings.push(record);
            }

            if signed_this_wave.is_empty() {
                warn!("Wave {} produced no signings; ending auction", wave);
                break;
            }
            waves = wave;
            info!(
                "Wave {} complete: {} signings, {} players and {} teams remain",
                wave,
                signed_this_wave.len(),
                matrix.remaining_players().len(),
                matrix.remaining_teams().len()
            );
        }

        let unsigned_players = matrix.remaining_players().iter().map(|s| s.to_string()).collect();
        let unsigned_teams = matrix.remaining_teams().iter().map(|s| s.to_string()).collect();

        info!(
            "Auction finished after {} waves: {} signings, {:.3} spent",
            waves,
            signings.len(),
            signings.iter().map(|s| s.price).sum::<f64>()
        );

        Ok(AuctionOutcome {
            signings,
            ledger,
            waves,
            unsigned_players,
            unsigned_teams,
        })
    }

    /// Column indices of the remaining teams in nomination order.
    fn nomination_order(&self, matrix: &NeedMatrix) -> Vec<usize> {
        let mut order: Vec<usize> = (0..matrix.team_count())
            .filter(|&col| matrix.is_team_active(col))
            .collect();
        if self.config.team_order == TeamOrder::Name {
            order.sort_by(|&a, &b| matrix.team_name(a).cmp(matrix.team_name(b)));
        }
        order
    }

    /// Auction one player among `bidders`, charge the winner, and return
    /// the winning column with its signing record.
    #[allow(clippy::too_many_arguments)]
    fn settle(
        &self,
        matrix: &NeedMatrix,
        ledger: &mut CapLedger,
        row: usize,
        nominator: usize,
        bidders: &[usize],
        pick: usize,
        wave: usize,
    ) -> Result<(usize, SigningRecord), AuctionError> {
        let player = matrix.player_name(row);

        let mut bids: Vec<Bid> = Vec::with_capacity(bidders.len());
        for &col in bidders {
            let team = matrix.team_name(col);
            let cap = ledger.get_cap(team).map_err(|_| {
                AuctionError::InconsistentState(format!("bidder {team} has no cap entry"))
            })?;
            bids.push(Bid {
                team: team.to_string(),
                amount: bid_amount(matrix.value(row, col), cap, self.config.scaling_factor),
                cap,
                col,
            });
        }
        rank_bids(&mut bids);

        let Some(top) = bids.first() else {
            return Err(AuctionError::InconsistentState(format!(
                "no bidders left for {player}"
            )));
        };
        let runner_up = bids.get(1).map(|b| b.amount);
        let price = clearing_price(top.amount, runner_up, top.cap, self.config.bid_war_premium);

        debug!(
            "{} nominated by {}: top bid {} {:.3}, runner-up {:?}, price {:.3}",
            player,
            matrix.team_name(nominator),
            top.team,
            top.amount,
            runner_up,
            price
        );

        ledger.deduct(&top.team, price)?;

        let record = SigningRecord {
            pick,
            wave,
            team: top.team.clone(),
            player: player.to_string(),
            price,
            nominated_by: matrix.team_name(nominator).to_string(),
            need: matrix.value(row, top.col),
        };
        Ok((top.col, record))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
