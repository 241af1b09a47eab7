//! Ordinary least-squares linear model of the post-vaccine label.
//!
//! The label (0/1) is regressed on the seven log-return features plus an
//! indicator per state, with the alphabetically first training state as the
//! reference level absorbed into the intercept.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::records::FeatureRecord;

/// Singular values below this fraction of the largest are treated as zero,
/// which yields the minimum-norm solution for aliased columns.
const RANK_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coefficient {
    pub term: String,
    pub estimate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinearModel {
    pub intercept: f64,
    /// Aligned with [`FeatureRecord::FEATURE_NAMES`].
    pub slopes: Vec<f64>,
    pub reference_state: String,
    /// Offsets relative to the reference state.
    pub state_effects: BTreeMap<String, f64>,
    pub n_obs: usize,
    pub r_squared: f64,
}

impl LinearModel {
    /// Fits the model to `rows`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Model`] if `rows` is empty or the least-squares
    /// solve fails.
    #[tracing::instrument(skip_all, fields(rows = rows.len()))]
    pub fn fit(rows: &[&FeatureRecord]) -> Result<Self> {
        if rows.is_empty() {
            return Err(PipelineError::Model("no training rows".into()));
        }

        let levels: Vec<&str> = rows
            .iter()
            .map(|r| r.state.as_str())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        let dummy_col: BTreeMap<&str, usize> = levels
            .iter()
            .skip(1)
            .enumerate()
            .map(|(j, s)| (*s, 1 + FeatureRecord::FEATURE_NAMES.len() + j))
            .collect();

        let n = rows.len();
        let p = 1 + FeatureRecord::FEATURE_NAMES.len() + dummy_col.len();

        let mut x = DMatrix::<f64>::zeros(n, p);
        let mut y = DVector::<f64>::zeros(n);
        for (i, row) in rows.iter().enumerate() {
            x[(i, 0)] = 1.0;
            for (j, value) in row.features().iter().enumerate() {
                x[(i, 1 + j)] = *value;
            }
            if let Some(&col) = dummy_col.get(row.state.as_str()) {
                x[(i, col)] = 1.0;
            }
            y[i] = if row.post_vaccine { 1.0 } else { 0.0 };
        }

        let svd = x.clone().svd(true, true);
        let eps = RANK_TOLERANCE * svd.singular_values.max();
        let rank = svd.rank(eps);
        if rank < p {
            warn!(rank, columns = p, "Design matrix is rank deficient");
        }
        let beta = svd
            .solve(&y, eps)
            .map_err(|e| PipelineError::Model(format!("least-squares solve failed: {e}")))?;

        let fitted = &x * &beta;
        let rss: f64 = (&y - &fitted).iter().map(|r| r * r).sum();
        let y_mean = y.mean();
        let tss: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
        let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };

        let n_features = FeatureRecord::FEATURE_NAMES.len();
        let model = LinearModel {
            intercept: beta[0],
            slopes: beta.rows(1, n_features).iter().copied().collect(),
            reference_state: levels[0].to_string(),
            state_effects: dummy_col
                .iter()
                .map(|(state, &col)| (state.to_string(), beta[col]))
                .collect(),
            n_obs: n,
            r_squared,
        };

        info!(
            n_obs = n,
            states = levels.len(),
            r_squared,
            "Linear model fitted"
        );
        Ok(model)
    }

    /// Continuous score for one record. A state unseen during fitting is
    /// scored at the reference level.
    pub fn predict(&self, record: &FeatureRecord) -> f64 {
        let linear: f64 = self
            .slopes
            .iter()
            .zip(record.features())
            .map(|(b, x)| b * x)
            .sum();

        let state_effect = if record.state == self.reference_state {
            0.0
        } else {
            match self.state_effects.get(&record.state) {
                Some(effect) => *effect,
                None => {
                    warn!(state = %record.state, "State not seen in training, using reference level");
                    0.0
                }
            }
        };

        self.intercept + linear + state_effect
    }

    /// Named coefficients in design-matrix order.
    pub fn coefficients(&self) -> Vec<Coefficient> {
        let mut out = vec![Coefficient {
            term: "(Intercept)".to_string(),
            estimate: self.intercept,
        }];
        out.extend(
            FeatureRecord::FEATURE_NAMES
                .iter()
                .zip(&self.slopes)
                .map(|(name, b)| Coefficient {
                    term: name.to_string(),
                    estimate: *b,
                }),
        );
        out.extend(self.state_effects.iter().map(|(state, b)| Coefficient {
            term: format!("state[{state}]"),
            estimate: *b,
        }));
        out
    }
}
