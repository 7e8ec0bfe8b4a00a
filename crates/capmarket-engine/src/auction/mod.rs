// Auction: the round-robin bidding engine and multi-round free agency.

pub mod engine;
pub mod rounds;
