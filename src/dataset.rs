//! Test-set holder and feature-domain derivation.
//!
//! The engine consumes inputs as named columns; the domains that bound the
//! MILP input variables are the per-column min/max of the data the network
//! was trained against.

use crate::interval::{FeatureDomains, Interval};
use crate::types::ExplicationError;
use serde::{Deserialize, Serialize};

/// Row-major data with named feature columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    feature_names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl Dataset {
    /// Build a dataset, checking every row against the column count.
    pub fn new(
        feature_names: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, ExplicationError> {
        let width = feature_names.len();
        for row in &rows {
            if row.len() != width {
                return Err(ExplicationError::InvalidInput {
                    expected: width,
                    actual: row.len(),
                });
            }
        }
        Ok(Self {
            feature_names,
            rows,
        })
    }

    /// Column names, in order.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// All rows.
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// One row.
    pub fn row(&self, index: usize) -> &[f64] {
        &self.rows[index]
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of feature columns.
    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Per-column `[min, max]` intervals.
    ///
    /// # Errors
    ///
    /// Returns [`ExplicationError::EmptyDataset`] when there are no rows to
    /// derive ranges from.
    pub fn feature_domains(&self) -> Result<FeatureDomains, ExplicationError> {
        if self.rows.is_empty() {
            return Err(ExplicationError::EmptyDataset);
        }
        let intervals = (0..self.num_features())
            .map(|column| {
                let mut lo = f64::INFINITY;
                let mut hi = f64::NEG_INFINITY;
                for row in &self.rows {
                    lo = lo.min(row[column]);
                    hi = hi.max(row[column]);
                }
                Interval::new(lo, hi)
            })
            .collect();
        Ok(FeatureDomains::new(intervals))
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Load a dataset from JSON, re-checking row widths.
    pub fn from_json(json: &str) -> Result<Self, ExplicationError> {
        let dataset: Self = serde_json::from_str(json)?;
        Self::new(dataset.feature_names, dataset.rows)
    }
}
