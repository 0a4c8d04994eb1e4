//! Rating model abstraction and the random-forest regressor loaded from disk.
//!
//! The forest is fitted by `prepare-artifacts` and stored as JSON: each tree is
//! a flat node array rooted at index 0, where split nodes send a sample left
//! when `x[feature] <= threshold`. The forest's prediction is the mean of the
//! leaf values reached in every tree.

use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid model file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid model: {0}")]
    Invalid(String),

    #[error("Feature count mismatch: model expects {expected}, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },
}

/// A pre-trained model predicting a rating for each feature row
#[cfg_attr(test, mockall::automock)]
pub trait RatingModel: Send + Sync {
    /// Number of columns each feature row must have
    fn n_features(&self) -> usize;

    /// Predicts one rating per row of `features`
    fn predict(&self, features: &Array2<f64>) -> Result<Array1<f64>, ModelError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Children must point forward so traversal always terminates
    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                left,
                right,
                threshold,
            } = node
            {
                if *feature >= n_features {
                    return Err(format!("node {i} splits on unknown feature {feature}"));
                }
                if !threshold.is_finite() {
                    return Err(format!("node {i} has a non-finite threshold"));
                }
                for child in [*left, *right] {
                    if child <= i || child >= self.nodes.len() {
                        return Err(format!("node {i} has invalid child {child}"));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Random-forest regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestModel {
    n_features: usize,
    trees: Vec<Tree>,
}

impl ForestModel {
    /// Builds and validates a forest
    pub fn new(n_features: usize, trees: Vec<Tree>) -> Result<Self, ModelError> {
        let model = Self { n_features, trees };
        model.validate()?;
        Ok(model)
    }

    /// Loads a forest from its JSON export
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let model: Self = serde_json::from_str(&raw)?;
        model.validate()?;

        tracing::info!(
            trees = model.trees.len(),
            n_features = model.n_features,
            "Loaded rating model"
        );

        Ok(model)
    }

    /// Writes the forest as JSON
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json).map_err(|source| ModelError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::Invalid("forest has no trees".to_string()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|reason| ModelError::Invalid(format!("tree {i}: {reason}")))?;
        }
        Ok(())
    }
}

impl RatingModel for ForestModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        if features.ncols() != self.n_features {
            return Err(ModelError::FeatureMismatch {
                expected: self.n_features,
                actual: features.ncols(),
            });
        }

        let tree_count = self.trees.len() as f64;
        let predictions = features
            .rows()
            .into_iter()
            .map(|row| {
                self.trees.iter().map(|tree| tree.predict_row(row)).sum::<f64>() / tree_count
            })
            .collect();

        Ok(predictions)
    }
}
