// Market entities: players, team rosters, and salary-cap bookkeeping.

pub mod ledger;
pub mod roster;
