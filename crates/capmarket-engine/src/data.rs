// Tabular input loading.
//
// Free agents come from a CSV with `Player Name`, `Madden OVR`, and
// optional `Season` and `Position` columns. Teams come from a CSV with a
// `team_name` column, optional `year` and `cap` columns, and one column
// per rating slot (`HB1`, `HB2`, `QB1`, ...). Every other column (win
// totals and the like) is ignored.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::market::roster::{Player, RosterState, Team};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("validation error: {0}")]
    Validation(String),
}

/// How to interpret and filter the input tables.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    /// Keep only rows for this season, when the table has a season column.
    pub season: Option<i32>,
    /// Position for free agents whose row has none.
    pub default_position: String,
    /// Cap for teams whose row has none.
    pub default_cap: f64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            season: None,
            default_position: "HB".into(),
            default_cap: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw CSV serde structs (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawFreeAgent {
    #[serde(rename = "Player Name", alias = "Name", alias = "name")]
    name: String,
    #[serde(rename = "Madden OVR", alias = "OVR", alias = "rating")]
    rating: f64,
    #[serde(rename = "Season", alias = "season", alias = "year", default)]
    season: Option<i32>,
    #[serde(rename = "Position", alias = "Pos", alias = "position", default)]
    position: Option<String>,
}

// ---------------------------------------------------------------------------
// Slot column parsing
// ---------------------------------------------------------------------------

/// Split a rating-slot header like `HB2` into `("HB", 2)`.
///
/// A slot header is one or more ASCII letters followed by one or more
/// digits, with a slot number of at least 1.
pub fn parse_slot_header(header: &str) -> Option<(String, u32)> {
    let header = header.trim();
    let split = header.find(|c: char| c.is_ascii_digit())?;
    let (prefix, digits) = header.split_at(split);
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let number: u32 = digits.parse().ok()?;
    if number == 0 {
        return None;
    }
    Some((prefix.to_uppercase(), number))
}

/// A rating-slot column: header index plus its parsed position and number.
#[derive(Debug, Clone)]
struct SlotColumn {
    index: usize,
    position: String,
    number: u32,
    /// Order in which the position first appeared in the header.
    group: usize,
}

fn slot_columns(headers: &csv::StringRecord) -> Vec<SlotColumn> {
    let mut groups: Vec<String> = Vec::new();
    let mut columns: Vec<SlotColumn> = Vec::new();

    for (index, header) in headers.iter().enumerate() {
        let Some((position, number)) = parse_slot_header(header) else {
            continue;
        };
        let group = match groups.iter().position(|g| *g == position) {
            Some(g) => g,
            None => {
                groups.push(position.clone());
                groups.len() - 1
            }
        };
        columns.push(SlotColumn {
            index,
            position,
            number,
            group,
        });
    }

    columns.sort_by_key(|c| (c.group, c.number));
    columns
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

// ---------------------------------------------------------------------------
// Reader-based loaders (testable without temp files)
// ---------------------------------------------------------------------------

fn free_agents_from_reader<R: Read>(rdr: R, opts: &LoadOptions) -> Result<Vec<Player>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut players = Vec::new();

    for result in reader.deserialize::<RawFreeAgent>() {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("skipping malformed free agent row: {}", e);
                continue;
            }
        };

        if let (Some(wanted), Some(season)) = (opts.season, raw.season) {
            if wanted != season {
                continue;
            }
        }
        if !raw.rating.is_finite() {
            warn!("skipping free agent '{}': non-finite rating", raw.name.trim());
            continue;
        }

        let position = raw
            .position
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(opts.default_position.as_str());
        players.push(Player::new(raw.name.trim(), position, raw.rating));
    }

    Ok(players)
}

fn teams_from_reader<R: Read>(rdr: R, opts: &LoadOptions) -> Result<Vec<Team>, LoadError> {
    let mut reader = csv::Reader::from_reader(rdr);
    let headers = reader
        .headers()
        .map_err(|e| LoadError::Csv {
            path: "<reader>".into(),
            source: e,
        })?
        .clone();

    let name_col = find_column(&headers, &["team_name", "team", "name"])
        .ok_or_else(|| LoadError::Validation("teams table has no team_name column".into()))?;
    let year_col = find_column(&headers, &["year", "season"]);
    let cap_col = find_column(&headers, &["cap", "cap_space", "salary_cap"]);
    let slots = slot_columns(&headers);
    if slots.is_empty() {
        return Err(LoadError::Validation(
            "teams table has no rating slot columns (e.g. HB1)".into(),
        ));
    }

    let mut teams = Vec::new();
    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("skipping malformed team row: {}", e);
                continue;
            }
        };

        let name = record.get(name_col).unwrap_or("").trim();
        if name.is_empty() {
            warn!("skipping team row without a name");
            continue;
        }

        if let (Some(wanted), Some(col)) = (opts.season, year_col) {
            match record.get(col).and_then(|y| y.trim().parse::<i32>().ok()) {
                Some(year) if year == wanted => {}
                _ => continue,
            }
        }

        let cap = match cap_col.and_then(|c| record.get(c)).map(str::trim) {
            Some(text) if !text.is_empty() => match text.parse::<f64>() {
                Ok(cap) if cap.is_finite() && cap >= 0.0 => cap,
                _ => {
                    warn!("skipping team '{}': invalid cap '{}'", name, text);
                    continue;
                }
            },
            _ => opts.default_cap,
        };

        // Every declared slot needs a rating; an empty cell would shift the
        // later slots down and misalign the predictor's features.
        let mut roster = RosterState::new();
        let mut bad_slot = None;
        for slot in &slots {
            let text = record.get(slot.index).unwrap_or("").trim();
            match text.parse::<f64>() {
                Ok(rating) if rating.is_finite() => roster.push_rating(&slot.position, rating),
                _ if text.is_empty() => {
                    bad_slot = Some(format!("missing rating in {}{}", slot.position, slot.number));
                    break;
                }
                _ => {
                    bad_slot = Some(format!("invalid rating in {}{}", slot.position, slot.number));
                    break;
                }
            }
        }
        if let Some(reason) = bad_slot {
            warn!("skipping team '{}': {}", name, reason);
            continue;
        }

        debug!("Loaded team {} with {} rating slots", name, roster.slot_count());
        teams.push(Team::new(name, roster, cap));
    }

    Ok(teams)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load free agents from a CSV file.
pub fn load_free_agents(path: &Path, opts: &LoadOptions) -> Result<Vec<Player>, LoadError> {
    let file = open(path)?;
    let players = free_agents_from_reader(file, opts).map_err(|e| LoadError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;
    ensure_unique(players.iter().map(|p| p.name.as_str()), "free agent")?;
    Ok(players)
}

/// Load teams from a CSV file.
pub fn load_teams(path: &Path, opts: &LoadOptions) -> Result<Vec<Team>, LoadError> {
    let file = open(path)?;
    let teams = teams_from_reader(file, opts).map_err(|e| match e {
        LoadError::Csv { source, .. } => LoadError::Csv {
            path: path.display().to_string(),
            source,
        },
        other => other,
    })?;
    ensure_unique(teams.iter().map(|t| t.name.as_str()), "team")?;
    Ok(teams)
}

fn open(path: &Path) -> Result<std::fs::File, LoadError> {
    std::fs::File::open(path).map_err(|e| LoadError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn ensure_unique<'a>(names: impl Iterator<Item = &'a str>, what: &str) -> Result<(), LoadError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(LoadError::Validation(format!("duplicate {what}: {name}")));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
