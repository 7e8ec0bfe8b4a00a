// SQLite persistence for auction runs.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use capmarket_engine::auction::engine::SigningRecord;
use capmarket_engine::auction::rounds::FreeAgencyOutcome;
use capmarket_engine::market::ledger::CapEntry;

/// Descriptive fields stored alongside each run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMeta {
    pub market: String,
    pub season: Option<i32>,
    pub scaling_factor: f64,
}

/// A stored signing together with the round it happened in.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSigning {
    pub round: usize,
    pub signing: SigningRecord,
}

/// SQLite-backed history of auction runs, their signings, and the caps
/// teams were left with.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS auction_runs (
                run_id         TEXT PRIMARY KEY,
                created_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                market         TEXT NOT NULL,
                season         INTEGER,
                scaling_factor REAL NOT NULL,
                rounds         INTEGER NOT NULL,
                waves          INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS signings (
                run_id       TEXT NOT NULL REFERENCES auction_runs(run_id),
                round        INTEGER NOT NULL,
                pick         INTEGER NOT NULL,
                wave         INTEGER NOT NULL,
                team         TEXT NOT NULL,
                player       TEXT NOT NULL,
                price        REAL NOT NULL,
                nominated_by TEXT NOT NULL,
                need         REAL NOT NULL,
                PRIMARY KEY (run_id, round, pick)
            );

            CREATE TABLE IF NOT EXISTS final_caps (
                run_id    TEXT NOT NULL REFERENCES auction_runs(run_id),
                team      TEXT NOT NULL,
                remaining REAL NOT NULL,
                PRIMARY KEY (run_id, team)
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Store a finished run: its metadata, every signing, and each team's
    /// remaining cap. Written in one transaction.
    pub fn record_run(&self, run_id: &str, meta: &RunMeta, outcome: &FreeAgencyOutcome) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin run transaction")?;

        let waves: usize = outcome.rounds.iter().map(|r| r.auction.waves).sum();
        tx.execute(
            "INSERT INTO auction_runs (run_id, market, season, scaling_factor, rounds, waves)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                meta.market,
                meta.season,
                meta.scaling_factor,
                outcome.rounds.len() as i64,
                waves as i64,
            ],
        )
        .with_context(|| format!("failed to insert auction run {run_id}"))?;

        for round in &outcome.rounds {
            for s in &round.auction.signings {
                tx.execute(
                    "INSERT INTO signings
                        (run_id, round, pick, wave, team, player, price, nominated_by, need)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        run_id,
                        round.round as i64,
                        s.pick as i64,
                        s.wave as i64,
                        s.team,
                        s.player,
                        s.price,
                        s.nominated_by,
                        s.need,
                    ],
                )
                .context("failed to insert signing")?;
            }
        }

        for team in &outcome.teams {
            tx.execute(
                "INSERT INTO final_caps (run_id, team, remaining) VALUES (?1, ?2, ?3)",
                params![run_id, team.name, team.cap],
            )
            .context("failed to insert final cap")?;
        }

        tx.commit().context("failed to commit run")?;
        Ok(())
    }

    /// Load a run's signings ordered by round, then pick.
    pub fn load_signings(&self, run_id: &str) -> Result<Vec<StoredSigning>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT round, pick, wave, team, player, price, nominated_by, need
                 FROM signings WHERE run_id = ?1 ORDER BY round, pick",
            )
            .context("failed to prepare load_signings query")?;

        let signings = stmt
            .query_map(params![run_id], |row| {
                let round: i64 = row.get(0)?;
                let pick: i64 = row.get(1)?;
                let wave: i64 = row.get(2)?;
                Ok(StoredSigning {
                    round: round as usize,
                    signing: SigningRecord {
                        pick: pick as usize,
                        wave: wave as usize,
                        team: row.get(3)?,
                        player: row.get(4)?,
                        price: row.get(5)?,
                        nominated_by: row.get(6)?,
                        need: row.get(7)?,
                    },
                })
            })
            .context("failed to query signings")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map signing rows")?;

        Ok(signings)
    }

    /// Load each team's remaining cap for a run, in the order they were
    /// recorded.
    pub fn load_caps(&self, run_id: &str) -> Result<Vec<CapEntry>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT team, remaining FROM final_caps WHERE run_id = ?1 ORDER BY rowid")
            .context("failed to prepare load_caps query")?;

        let caps = stmt
            .query_map(params![run_id], |row| {
                Ok(CapEntry {
                    team: row.get(0)?,
                    remaining: row.get(1)?,
                })
            })
            .context("failed to query final caps")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map final cap rows")?;

        Ok(caps)
    }

    /// The most recently recorded run, if any.
    pub fn latest_run_id(&self) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT run_id FROM auction_runs ORDER BY created_at DESC, rowid DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .context("failed to query latest run")
    }

    /// Number of runs recorded.
    pub fn run_count(&self) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM auction_runs", [], |row| row.get(0))
            .context("failed to count runs")?;
        Ok(count as usize)
    }

    /// Generate a new run ID from the current UTC timestamp.
    ///
    /// Format: `run_YYYYMMDD_HHMMSS_SSS` (e.g. `run_20241019_143022_123`).
    pub fn generate_run_id() -> String {
        let now = chrono::Utc::now();
        now.format("run_%Y%m%d_%H%M%S_%3f").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capmarket_engine::auction::engine::AuctionConfig;
    use capmarket_engine::auction::rounds::FreeAgency;
    use capmarket_engine::market::roster::{Player, RosterState, Team};

    const TEST_RUN_ID: &str = "test_run_001";

    /// Helper: create a fresh in-memory database for each test.
    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn meta() -> RunMeta {
        RunMeta {
            market: "Test Market".into(),
            season: Some(2024),
            scaling_factor: 1.0,
        }
    }

    fn hb_team(name: &str, rating: f64, cap: f64) -> Team {
        let mut roster = RosterState::new();
        roster.push_rating("HB", rating);
        Team::new(name, roster, cap)
    }

    /// Helper: two rounds of a small market so the outcome has signings in
    /// more than one round.
    fn sample_outcome() -> FreeAgencyOutcome {
        let players = vec![
            Player::new("P1", "HB", 90.0),
            Player::new("P2", "HB", 85.0),
            Player::new("P3", "HB", 80.0),
        ];
        let teams = vec![hb_team("A", 60.0, 10.0), hb_team("B", 70.0, 10.0)];
        let toy = |r: &RosterState| r.best_rating("HB").unwrap_or(0.0) / 10.0;
        FreeAgency::new(&toy, AuctionConfig::default())
            .run_rounds(&players, &teams, 3)
            .unwrap()
    }

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"auction_runs".to_string()));
        assert!(tables.contains(&"signings".to_string()));
        assert!(tables.contains(&"final_caps".to_string()));
    }

    #[test]
    fn record_and_load_run_round_trip() {
        let db = test_db();
        let outcome = sample_outcome();
        db.record_run(TEST_RUN_ID, &meta(), &outcome).unwrap();

        let stored = db.load_signings(TEST_RUN_ID).unwrap();
        assert_eq!(stored.len(), outcome.signing_count());

        let expected: Vec<(usize, &SigningRecord)> = outcome
            .rounds
            .iter()
            .flat_map(|r| r.auction.signings.iter().map(move |s| (r.round, s)))
            .collect();
        for (got, (round, want)) in stored.iter().zip(expected) {
            assert_eq!(got.round, round);
            assert_eq!(&got.signing, want);
        }

        let caps = db.load_caps(TEST_RUN_ID).unwrap();
        let names: Vec<&str> = caps.iter().map(|c| c.team.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        for (cap, team) in caps.iter().zip(&outcome.teams) {
            assert_eq!(cap.remaining, team.cap);
        }
    }

    #[test]
    fn load_signings_returns_empty_vec_for_unknown_run() {
        let db = test_db();
        assert!(db.load_signings("nope").unwrap().is_empty());
        assert!(db.load_caps("nope").unwrap().is_empty());
    }

    #[test]
    fn recording_same_run_twice_fails() {
        let db = test_db();
        let outcome = sample_outcome();
        db.record_run(TEST_RUN_ID, &meta(), &outcome).unwrap();
        assert!(db.record_run(TEST_RUN_ID, &meta(), &outcome).is_err());

        // The failed transaction left the first run intact
        assert_eq!(db.run_count().unwrap(), 1);
        assert_eq!(
            db.load_signings(TEST_RUN_ID).unwrap().len(),
            outcome.signing_count()
        );
    }

    #[test]
    fn latest_run_id_tracks_newest_run() {
        let db = test_db();
        assert_eq!(db.latest_run_id().unwrap(), None);

        let outcome = sample_outcome();
        db.record_run("run_a", &meta(), &outcome).unwrap();
        db.record_run("run_b", &meta(), &outcome).unwrap();
        assert_eq!(db.latest_run_id().unwrap().as_deref(), Some("run_b"));
        assert_eq!(db.run_count().unwrap(), 2);
    }

    #[test]
    fn runs_are_scoped_by_id() {
        let db = test_db();
        let outcome = sample_outcome();
        db.record_run("run_a", &meta(), &outcome).unwrap();
        assert!(db.load_signings("run_b").unwrap().is_empty());
    }

    #[test]
    fn foreign_keys_enforced() {
        let db = test_db();
        let conn = db.conn();
        let result = conn.execute(
            "INSERT INTO final_caps (run_id, team, remaining) VALUES ('missing', 'A', 1.0)",
            [],
        );
        assert!(result.is_err(), "insert with unknown run_id should fail");
    }

    #[test]
    fn generate_run_id_format() {
        let id = Database::generate_run_id();
        assert!(id.starts_with("run_"), "Run ID should start with 'run_': {}", id);
        // run_YYYYMMDD_HHMMSS_SSS
        assert_eq!(id.len(), 23, "unexpected run ID length: {}", id);
    }
}
