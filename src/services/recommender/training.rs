//! Fits the random-forest rating model and writes every recommender artifact.
//!
//! Trees are CART regressors grown on bootstrap samples, splitting on the
//! largest reduction in squared error. Feature importances are the per-tree
//! share of that reduction, averaged over the forest.

use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::dataset::{Dataset, DatasetError};
use super::encoding::{EncoderSet, EncodingError, CATEGORICAL_COLUMNS, NUMERIC_COLUMN};
use super::model::{ForestModel, ModelError, Node, RatingModel, Tree};
use super::{DATA_FILE, ENCODERS_FILE, MODEL_FILE};

/// Per-feature importances written next to the model
pub const IMPORTANCE_FILE: &str = "feature_importance.csv";

/// Splits must reduce squared error by more than this
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("Cannot train on an empty dataset")]
    EmptyDataset,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Failed to write feature importances: {0}")]
    Csv(#[from] csv::Error),
}

/// Forest hyperparameters
#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Features tried at each split; `None` tries all of them
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 16,
            min_samples_split: 2,
            max_features: None,
            seed: 42,
        }
    }
}

/// Encoded feature rows with their ratings
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub features: Array2<f64>,
    pub targets: Array1<f64>,
}

impl TrainingSet {
    /// Encodes every record on its own values
    pub fn from_dataset(dataset: &Dataset, encoders: &EncoderSet) -> Result<Self, EncodingError> {
        let mut features = Array2::zeros((dataset.len(), feature_names().len()));
        for (i, record) in dataset.records().iter().enumerate() {
            let row = encoders.feature_row(record, None, None)?;
            features.row_mut(i).assign(&ArrayView1::from(&row[..]));
        }
        let targets = dataset.records().iter().map(|r| r.rating).collect();

        Ok(Self { features, targets })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Shuffles rows and holds out `test_fraction` of them, keeping at least
    /// one row for training.
    pub fn split(&self, test_fraction: f64, seed: u64) -> (Self, Self) {
        let mut rows: Vec<usize> = (0..self.len()).collect();
        rows.shuffle(&mut StdRng::seed_from_u64(seed));

        let n_test = (self.len() as f64 * test_fraction.clamp(0.0, 1.0)).ceil() as usize;
        let n_test = n_test.min(self.len().saturating_sub(1));
        let (test, train) = rows.split_at(n_test);

        (self.select(train), self.select(test))
    }

    fn select(&self, rows: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), rows),
            targets: self.targets.select(Axis(0), rows),
        }
    }
}

/// A fitted forest and how much each feature contributed to its splits
#[derive(Debug, Clone)]
pub struct FittedForest {
    pub model: ForestModel,
    pub importances: Vec<f64>,
}

/// Grows a forest on bootstrap samples of `data`
pub fn fit_forest(data: &TrainingSet, params: &ForestParams) -> Result<FittedForest, TrainingError> {
    if data.is_empty() {
        return Err(TrainingError::EmptyDataset);
    }

    let n_rows = data.len();
    let n_features = data.features.ncols();
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut importances = vec![0.0; n_features];
    let mut trees = Vec::with_capacity(params.n_trees.max(1));

    for _ in 0..params.n_trees.max(1) {
        let mut sample: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect();

        let mut builder = TreeBuilder {
            data,
            params,
            rng: &mut rng,
            nodes: Vec::new(),
            gains: vec![0.0; n_features],
        };
        builder.grow(&mut sample, 0);

        let total: f64 = builder.gains.iter().sum();
        if total > 0.0 {
            for (acc, gain) in importances.iter_mut().zip(&builder.gains) {
                *acc += gain / total;
            }
        }
        trees.push(Tree {
            nodes: builder.nodes,
        });
    }

    let total: f64 = importances.iter().sum();
    if total > 0.0 {
        importances.iter_mut().for_each(|v| *v /= total);
    }

    Ok(FittedForest {
        model: ForestModel::new(n_features, trees)?,
        importances,
    })
}

/// Coefficient of determination of the model's predictions on `data`
pub fn r2_score(model: &dyn RatingModel, data: &TrainingSet) -> Result<f64, ModelError> {
    let predictions = model.predict(&data.features)?;
    let mean = data.targets.mean().unwrap_or(0.0);

    let ss_tot: f64 = data.targets.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = data
        .targets
        .iter()
        .zip(predictions.iter())
        .map(|(y, p)| (y - p).powi(2))
        .sum();

    if ss_tot <= 0.0 {
        return Ok(if ss_res <= 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

/// Column names of a feature row, in order
pub fn feature_names() -> Vec<&'static str> {
    CATEGORICAL_COLUMNS
        .iter()
        .copied()
        .chain(std::iter::once(NUMERIC_COLUMN))
        .collect()
}

#[derive(Serialize)]
struct ImportanceRow<'a> {
    feature: &'a str,
    importance: f64,
}

/// Writes `feature,importance` rows
pub fn write_importances(path: &Path, importances: &[f64]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    for (feature, &importance) in feature_names().into_iter().zip(importances) {
        writer.serialize(ImportanceRow {
            feature,
            importance,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// What a preparation run produced
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub train_rows: usize,
    pub test_rows: usize,
    pub trees: usize,
    pub train_score: f64,
    pub test_score: Option<f64>,
    pub importances: Vec<f64>,
}

/// Writes the processed dataset, label encoders, fitted model and feature
/// importances into `output_dir`.
pub fn prepare_artifacts(
    dataset: &Dataset,
    output_dir: &Path,
    params: &ForestParams,
    test_fraction: f64,
) -> Result<TrainingReport, TrainingError> {
    if dataset.is_empty() {
        return Err(TrainingError::EmptyDataset);
    }
    std::fs::create_dir_all(output_dir).map_err(|source| TrainingError::Io {
        path: output_dir.display().to_string(),
        source,
    })?;

    tracing::info!("Encoding categorical features");
    let encoders = EncoderSet::fit(dataset);

    tracing::info!("Saving processed data and encoders");
    dataset.write(&output_dir.join(DATA_FILE))?;
    encoders.save(&output_dir.join(ENCODERS_FILE))?;

    let data = TrainingSet::from_dataset(dataset, &encoders)?;
    let (train, test) = data.split(test_fraction, params.seed);

    tracing::info!(
        train_rows = train.len(),
        test_rows = test.len(),
        trees = params.n_trees,
        "Training random forest"
    );
    let fitted = fit_forest(&train, params)?;

    let train_score = r2_score(&fitted.model, &train)?;
    tracing::info!("Training score (R²): {:.4}", train_score);
    let test_score = if test.is_empty() {
        tracing::warn!("No rows held out, skipping test score");
        None
    } else {
        let score = r2_score(&fitted.model, &test)?;
        tracing::info!("Testing score (R²): {:.4}", score);
        Some(score)
    };

    tracing::info!("Saving trained model");
    fitted.model.save(&output_dir.join(MODEL_FILE))?;
    write_importances(&output_dir.join(IMPORTANCE_FILE), &fitted.importances)?;

    Ok(TrainingReport {
        train_rows: train.len(),
        test_rows: test.len(),
        trees: fitted.model.tree_count(),
        train_score,
        test_score,
        importances: fitted.importances,
    })
}

struct TreeBuilder<'a> {
    data: &'a TrainingSet,
    params: &'a ForestParams,
    rng: &'a mut StdRng,
    nodes: Vec<Node>,
    gains: Vec<f64>,
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder<'_> {
    /// Grows the subtree for `rows`, returning its root index.
    ///
    /// The parent is pushed before its children, so children always point
    /// forward in the node array.
    fn grow(&mut self, rows: &mut [usize], depth: usize) -> usize {
        let index = self.nodes.len();
        let mean = rows.iter().map(|&r| self.data.targets[r]).sum::<f64>() / rows.len() as f64;
        self.nodes.push(Node::Leaf { value: mean });

        if depth >= self.params.max_depth || rows.len() < self.params.min_samples_split.max(2) {
            return index;
        }
        let Some(split) = self.best_split(rows) else {
            return index;
        };
        self.gains[split.feature] += split.gain;

        let mut mid = 0;
        for i in 0..rows.len() {
            if self.data.features[[rows[i], split.feature]] <= split.threshold {
                rows.swap(i, mid);
                mid += 1;
            }
        }
        let (left_rows, right_rows) = rows.split_at_mut(mid);
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);

        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    fn best_split(&mut self, rows: &[usize]) -> Option<Split> {
        let features = &self.data.features;
        let targets = &self.data.targets;
        let n_features = features.ncols();
        let tried = self
            .params
            .max_features
            .unwrap_or(n_features)
            .clamp(1, n_features);

        let n = rows.len() as f64;
        let total_sum: f64 = rows.iter().map(|&r| targets[r]).sum();
        let total_sq: f64 = rows.iter().map(|&r| targets[r].powi(2)).sum();
        let parent_sse = total_sq - total_sum * total_sum / n;

        let mut best: Option<Split> = None;
        let mut sorted = rows.to_vec();

        for feature in index::sample(&mut *self.rng, n_features, tried).iter() {
            sorted.sort_by(|&a, &b| features[[a, feature]].total_cmp(&features[[b, feature]]));

            let (mut left_sum, mut left_sq) = (0.0, 0.0);
            for i in 0..sorted.len() - 1 {
                let y = targets[sorted[i]];
                left_sum += y;
                left_sq += y * y;

                let here = features[[sorted[i], feature]];
                let next = features[[sorted[i + 1], feature]];
                if next <= here {
                    continue;
                }

                let n_left = (i + 1) as f64;
                let n_right = n - n_left;
                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / n_left)
                    + (right_sq - right_sum * right_sum / n_right);
                let gain = parent_sse - sse;

                if gain > best.as_ref().map_or(MIN_GAIN, |b| b.gain) {
                    best = Some(Split {
                        feature,
                        threshold: (here + next) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::super::dataset::fixtures::sample_dataset;
    use super::super::{RankingMode, RecommendationQuery, Recommender};
    use super::*;
    use ndarray::array;

    fn params(n_trees: usize) -> ForestParams {
        ForestParams {
            n_trees,
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_single_tree_learns_a_step() {
        let data = TrainingSet {
            features: array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]],
            targets: array![3.0, 3.0, 4.5, 4.5],
        };
        let fitted = fit_forest(&data, &params(25)).unwrap();

        let predictions = fitted.model.predict(&array![[1.5, 0.0], [3.5, 0.0]]).unwrap();
        assert!(predictions[0] < predictions[1]);
        assert!(r2_score(&fitted.model, &data).unwrap() > 0.5);

        // the constant column never splits
        assert_eq!(fitted.importances[1], 0.0);
        assert!((fitted.importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_targets_give_single_leaves() {
        let data = TrainingSet {
            features: array![[1.0], [2.0], [3.0]],
            targets: array![4.0, 4.0, 4.0],
        };
        let fitted = fit_forest(&data, &params(3)).unwrap();

        assert_eq!(fitted.model.predict(&array![[9.0]]).unwrap(), array![4.0]);
        assert_eq!(r2_score(&fitted.model, &data).unwrap(), 1.0);
    }

    #[test]
    fn test_empty_training_set_is_rejected() {
        let data = TrainingSet {
            features: Array2::zeros((0, 2)),
            targets: Array1::zeros(0),
        };
        assert!(matches!(
            fit_forest(&data, &params(1)),
            Err(TrainingError::EmptyDataset)
        ));
    }

    #[test]
    fn test_split_holds_out_a_fraction() {
        let dataset = sample_dataset();
        let data = TrainingSet::from_dataset(&dataset, &EncoderSet::fit(&dataset)).unwrap();

        let (train, test) = data.split(0.2, 42);
        assert_eq!(train.len(), 4);
        assert_eq!(test.len(), 1);

        let (train, test) = data.split(1.0, 42);
        assert_eq!(train.len(), 1);
        assert_eq!(test.len(), 4);
    }

    #[test]
    fn test_prepared_artifacts_load_and_recommend() {
        let dir = tempfile::tempdir().unwrap();
        let report = prepare_artifacts(&sample_dataset(), dir.path(), &params(10), 0.2).unwrap();

        assert_eq!(report.trees, 10);
        assert_eq!(report.train_rows + report.test_rows, 5);
        assert!(report.test_score.is_some());

        let importances = std::fs::read_to_string(dir.path().join(IMPORTANCE_FILE)).unwrap();
        assert!(importances.starts_with("feature,importance"));
        assert_eq!(importances.lines().count(), 1 + feature_names().len());

        let recommender = Recommender::load(dir.path(), RankingMode::PerRow).unwrap();
        let result = recommender.recommend(
            &RecommendationQuery::new(Some("beach".into()), None).with_limit(5),
        );
        assert!(!result.degraded);
        assert_eq!(result.spots.len(), 2);
        for spot in &result.spots {
            let predicted = spot.predicted_rating.unwrap();
            assert!((3.9..=4.8).contains(&predicted));
        }
    }

    #[test]
    fn test_empty_dataset_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let empty = Dataset::new(Vec::new());

        assert!(prepare_artifacts(&empty, dir.path(), &params(1), 0.2).is_err());
        assert!(!dir.path().join(MODEL_FILE).exists());
    }
}
