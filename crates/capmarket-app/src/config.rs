// Configuration loading and parsing (market.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use capmarket_engine::auction::engine::{AuctionConfig, TeamOrder};
use capmarket_engine::data::LoadOptions;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub market: MarketConfig,
    pub auction: AuctionSection,
    pub data_paths: DataPaths,
    pub output: OutputConfig,
    pub db_path: String,
}

impl Config {
    /// Engine settings for each auction round.
    pub fn auction_config(&self) -> AuctionConfig {
        AuctionConfig {
            scaling_factor: self.auction.scaling_factor,
            bid_war_premium: self.auction.bid_war_premium,
            team_order: self.auction.team_order,
        }
    }

    /// How the input tables should be filtered and defaulted.
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            season: self.market.season,
            default_position: self.market.default_position.clone(),
            default_cap: self.market.default_cap,
        }
    }
}

// ---------------------------------------------------------------------------
// market.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire market.toml file.
#[derive(Debug, Clone, Deserialize)]
struct MarketFile {
    market: MarketConfig,
    auction: AuctionSection,
    data_paths: DataPaths,
    output: OutputConfig,
    database: DatabaseSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    pub name: String,
    /// Season to filter both input tables on. All rows are used when unset.
    #[serde(default)]
    pub season: Option<i32>,
    pub default_position: String,
    pub default_cap: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuctionSection {
    pub scaling_factor: f64,
    pub bid_war_premium: f64,
    #[serde(default)]
    pub team_order: TeamOrder,
    pub rounds: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    pub free_agents: String,
    pub teams: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub directory: String,
    pub top_matches: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/market.toml` relative to
/// `base_dir`.
///
/// Does not copy defaults; `load_config()` does that first.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let market_path = base_dir.join("config").join("market.toml");
    let text = read_file(&market_path)?;
    let file: MarketFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: market_path.clone(),
        source: e,
    })?;

    let config = Config {
        market: file.market,
        auction: file.auction,
        data_paths: file.data_paths,
        output: file.output,
        db_path: file.database.path,
    };

    validate(&config)?;

    Ok(config)
}

/// Files the app reads from `config/`, each seeded from `defaults/`.
pub const CONFIG_FILES: &[&str] = &["market.toml", "model.toml"];

/// Seed `config/` with any of `CONFIG_FILES` it is missing, copying from
/// `defaults/`. Existing files are left alone. Returns the files written.
///
/// Fails when `market.toml` is in neither directory, since nothing can be
/// loaded then.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    let copy_err = |message: String| ConfigError::DefaultsCopyError { message };

    let mut copied = Vec::new();
    for name in CONFIG_FILES {
        let target = config_dir.join(name);
        let source = defaults_dir.join(name);
        if target.exists() {
            continue;
        }
        if !source.is_file() {
            if *name == "market.toml" {
                return Err(copy_err(format!(
                    "market.toml is in neither {} nor {}",
                    config_dir.display(),
                    defaults_dir.display()
                )));
            }
            continue;
        }

        std::fs::create_dir_all(&config_dir)
            .map_err(|e| copy_err(format!("cannot create {}: {e}", config_dir.display())))?;
        std::fs::copy(&source, &target).map_err(|e| {
            copy_err(format!(
                "cannot copy {} to {}: {e}",
                source.display(),
                target.display()
            ))
        })?;
        copied.push(target);
    }

    Ok(copied)
}

/// Loads config relative to the current working directory, copying any
/// missing default files first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.market.default_position.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "market.default_position".into(),
            message: "must not be empty".into(),
        });
    }

    let cap = config.market.default_cap;
    if !cap.is_finite() || cap < 0.0 {
        return Err(ConfigError::ValidationError {
            field: "market.default_cap".into(),
            message: format!("must be >= 0, got {cap}"),
        });
    }

    let scale = config.auction.scaling_factor;
    if !scale.is_finite() || scale < 0.0 {
        return Err(ConfigError::ValidationError {
            field: "auction.scaling_factor".into(),
            message: format!("must be a finite value >= 0, got {scale}"),
        });
    }

    let premium = config.auction.bid_war_premium;
    if !(0.0..=1.0).contains(&premium) {
        return Err(ConfigError::ValidationError {
            field: "auction.bid_war_premium".into(),
            message: format!("must be between 0.0 and 1.0 inclusive, got {premium}"),
        });
    }

    if config.auction.rounds == 0 {
        return Err(ConfigError::ValidationError {
            field: "auction.rounds".into(),
            message: "must be greater than 0".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
