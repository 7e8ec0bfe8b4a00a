// Win prediction boundary.
//
// The need matrix only depends on `WinPredictor`; how the underlying model
// was trained or persisted is someone else's concern. `LinearWinPredictor`
// evaluates persisted linear coefficients over standardized slot ratings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::market::roster::RosterState;

/// Predicts a team's season win total from its roster ratings.
///
/// Implementations must be deterministic: identical rosters give identical
/// predictions.
pub trait WinPredictor {
    fn predict_wins(&self, roster: &RosterState) -> f64;
}

impl<F> WinPredictor for F
where
    F: Fn(&RosterState) -> f64,
{
    fn predict_wins(&self, roster: &RosterState) -> f64 {
        (self)(roster)
    }
}

// ---------------------------------------------------------------------------
// Linear model
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse model file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid model coefficient `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

/// Wrapper for the top-level `[model]` table in a model file.
#[derive(Debug, Deserialize)]
struct ModelFile {
    model: LinearWinPredictor,
}

/// `wins = intercept + sum(weight[f] * (x[f] - mean[f]) / scale[f])`
///
/// Features without a weight contribute nothing; a missing mean defaults
/// to 0 and a missing scale to 1.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinearWinPredictor {
    pub intercept: f64,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub means: BTreeMap<String, f64>,
    #[serde(default)]
    pub scales: BTreeMap<String, f64>,
}

impl LinearWinPredictor {
    pub fn new(intercept: f64, weights: BTreeMap<String, f64>) -> Self {
        LinearWinPredictor {
            intercept,
            weights,
            ..Default::default()
        }
    }

    /// Load coefficients from a TOML model file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let text = std::fs::read_to_string(path).map_err(|_| ModelError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        Self::from_toml_str(&text).map_err(|e| match e {
            ModelError::ParseError { source, .. } => ModelError::ParseError {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse coefficients from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ModelError> {
        let file: ModelFile = toml::from_str(text).map_err(|e| ModelError::ParseError {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        file.model.validate()?;
        Ok(file.model)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if !self.intercept.is_finite() {
            return Err(ModelError::ValidationError {
                field: "intercept".into(),
                message: "must be finite".into(),
            });
        }
        for (name, val) in self.weights.iter().chain(self.means.iter()) {
            if !val.is_finite() {
                return Err(ModelError::ValidationError {
                    field: name.clone(),
                    message: format!("must be finite, got {val}"),
                });
            }
        }
        for (name, val) in &self.scales {
            if !val.is_finite() || *val <= 0.0 {
                return Err(ModelError::ValidationError {
                    field: format!("scales.{name}"),
                    message: format!("must be > 0, got {val}"),
                });
            }
        }
        Ok(())
    }
}

impl WinPredictor for LinearWinPredictor {
    fn predict_wins(&self, roster: &RosterState) -> f64 {
        roster
            .features()
            .iter()
            .filter_map(|(name, x)| {
                let w = self.weights.get(name)?;
                let mean = self.means.get(name).copied().unwrap_or(0.0);
                let scale = self.scales.get(name).copied().unwrap_or(1.0);
                Some(w * (x - mean) / scale)
            })
            .fold(self.intercept, |acc, term| acc + term)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
