//! Linear model backend.
//!
//! The artifact is a JSON document holding the fitted coefficients:
//!
//! ```json
//! {"weights": [1.0, 1.0, 1.0], "bias": 0.0, "task": "classification", "threshold": 0.0}
//! ```

use super::Predictor;
use crate::config::ModelFormat;
use crate::error::{PredictError, PredictResult};
use serde::{Deserialize, Serialize};

/// What the linear score is turned into
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    /// Compare the score against a threshold and emit one of two labels
    #[default]
    Classification,
    /// Emit the score truncated toward zero
    Regression,
}

/// Deserialized linear model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearModel {
    pub weights: Vec<f64>,
    #[serde(default)]
    pub bias: f64,
    #[serde(default)]
    pub task: Task,
    /// Decision threshold for classification (score must exceed it)
    #[serde(default)]
    pub threshold: f64,
    /// Labels emitted for scores at-or-below / above the threshold
    #[serde(default = "default_labels")]
    pub labels: [i64; 2],
    /// Feature names in weight order
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
}

fn default_labels() -> [i64; 2] {
    [0, 1]
}

impl LinearModel {
    /// Deserialize and validate an artifact payload
    pub fn from_slice(bytes: &[u8]) -> Result<Self, String> {
        let model: LinearModel = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.weights.is_empty() {
            return Err("weights must not be empty".to_string());
        }
        if let Some(i) = self.weights.iter().position(|w| !w.is_finite()) {
            return Err(format!("weight {} is not finite", i));
        }
        if !self.bias.is_finite() || !self.threshold.is_finite() {
            return Err("bias and threshold must be finite".to_string());
        }
        if let Some(names) = &self.feature_names {
            if names.len() != self.weights.len() {
                return Err(format!(
                    "{} feature names for {} weights",
                    names.len(),
                    self.weights.len()
                ));
            }
        }
        Ok(())
    }

    /// Raw linear score `w·x + b`
    pub fn score(&self, row: &[f64]) -> f64 {
        self.weights
            .iter()
            .zip(row)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias
    }
}

impl Predictor for LinearModel {
    fn format(&self) -> ModelFormat {
        ModelFormat::Linear
    }

    fn input_width(&self) -> Option<usize> {
        Some(self.weights.len())
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn predict_row(&self, row: &[f64]) -> PredictResult<i64> {
        if row.len() != self.weights.len() {
            return Err(PredictError::ShapeMismatch {
                expected: self.weights.len(),
                actual: row.len(),
            });
        }

        let score = self.score(row);
        if !score.is_finite() {
            return Err(PredictError::InferenceFailed(format!(
                "linear score is not finite ({})",
                score
            )));
        }

        match self.task {
            Task::Classification => Ok(if score > self.threshold {
                self.labels[1]
            } else {
                self.labels[0]
            }),
            Task::Regression => {
                let truncated = score.trunc();
                if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
                    return Err(PredictError::InferenceFailed(format!(
                        "regression output {} does not fit an integer",
                        score
                    )));
                }
                Ok(truncated as i64)
            }
        }
    }
}
