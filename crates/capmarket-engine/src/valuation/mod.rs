// Valuation: win prediction and the player-by-team need matrix.

pub mod need;
pub mod predictor;
