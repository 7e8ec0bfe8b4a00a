// Library root: free-agent need scoring and the cap-constrained auction
// that allocates free agents to teams.

pub mod auction;
pub mod data;
pub mod market;
pub mod report;
pub mod valuation;
