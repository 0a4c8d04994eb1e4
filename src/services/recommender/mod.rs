//! Tourist spot recommendations.
//!
//! A query is matched against the dataset in tiers (category and location,
//! category only, location only) and the first non-empty tier is ranked by the
//! rating model. When no tier matches, or anything in filtering, encoding or
//! prediction fails, the whole dataset is ranked by its actual rating instead.

use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use ndarray::Array2;
use serde::Serialize;

pub mod dataset;
pub mod encoding;
pub mod model;
pub mod training;

pub use dataset::{Dataset, DatasetError, SpotRecord};
pub use encoding::{EncoderSet, EncodingError, LabelEncoder, FEATURE_COUNT};
pub use model::{ForestModel, ModelError, RatingModel};
pub use training::{prepare_artifacts, ForestParams, TrainingError, TrainingReport};

/// Artifact file names inside the model directory
pub const MODEL_FILE: &str = "random_forest_model.json";
pub const ENCODERS_FILE: &str = "label_encoders.json";
pub const DATA_FILE: &str = "processed_data.csv";

#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error("Encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Prediction failed: {0}")]
    Model(#[from] ModelError),

    #[error("Model returned {actual} predictions for {expected} spots")]
    PredictionCount { expected: usize, actual: usize },

    #[error("Model returned a non-finite rating")]
    NonFinitePrediction,
}

/// How matched spots are scored by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankingMode {
    /// Score every matched spot from its own features
    #[default]
    PerRow,
    /// Score the first matched spot once and give every match that rating,
    /// which leaves the matched set in dataset order
    Broadcast,
}

impl FromStr for RankingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "per_row" => Ok(Self::PerRow),
            "broadcast" => Ok(Self::Broadcast),
            other => Err(format!("unknown ranking mode '{other}'")),
        }
    }
}

/// Fallback level that produced a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    CategoryAndLocation,
    Category,
    Location,
    TopRated,
}

/// A recommendation request
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationQuery {
    pub category: Option<String>,
    pub location: Option<String>,
    pub min_rating: f64,
    pub limit: usize,
}

impl RecommendationQuery {
    pub fn new(category: Option<String>, location: Option<String>) -> Self {
        Self {
            category,
            location,
            min_rating: 0.0,
            limit: 5,
        }
    }

    pub fn with_min_rating(mut self, min_rating: f64) -> Self {
        self.min_rating = min_rating;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// A dataset spot with the model's rating, when the model was consulted
#[derive(Debug, Clone, PartialEq)]
pub struct RankedSpot {
    pub record: SpotRecord,
    pub predicted_rating: Option<f64>,
}

/// Result of a recommendation lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendations {
    pub tier: MatchTier,
    /// Set when ranking failed and the rating-sorted fallback was served
    pub degraded: bool,
    pub spots: Vec<RankedSpot>,
}

/// Ranks dataset spots for a query. Loaded once and shared read-only.
pub struct Recommender {
    dataset: Dataset,
    encoders: EncoderSet,
    model: Box<dyn RatingModel>,
    ranking: RankingMode,
}

impl Recommender {
    pub fn new(
        dataset: Dataset,
        encoders: EncoderSet,
        model: Box<dyn RatingModel>,
        ranking: RankingMode,
    ) -> Self {
        Self {
            dataset,
            encoders,
            model,
            ranking,
        }
    }

    /// Loads the model, encoders and dataset from `model_dir`
    pub fn load(model_dir: &Path, ranking: RankingMode) -> anyhow::Result<Self> {
        for file in [MODEL_FILE, ENCODERS_FILE, DATA_FILE] {
            let path = model_dir.join(file);
            if !path.exists() {
                anyhow::bail!("Model file not found: {}", path.display());
            }
        }

        tracing::info!(model_dir = %model_dir.display(), "Loading model components");

        let model = ForestModel::load(&model_dir.join(MODEL_FILE))
            .context("Failed to load rating model")?;
        if model.n_features() != FEATURE_COUNT {
            anyhow::bail!(
                "Model expects {} features, recommender builds {}",
                model.n_features(),
                FEATURE_COUNT
            );
        }
        let encoders = EncoderSet::load(&model_dir.join(ENCODERS_FILE))
            .context("Failed to load label encoders")?;
        let dataset =
            Dataset::load(&model_dir.join(DATA_FILE)).context("Failed to load spot dataset")?;

        tracing::info!(
            spots = dataset.len(),
            ranking = ?ranking,
            "Recommender loaded"
        );

        Ok(Self::new(dataset, encoders, Box::new(model), ranking))
    }

    /// Returns up to `query.limit` spots for the query.
    ///
    /// Never fails: ranking errors are logged and answered with the
    /// rating-sorted top spots. The minimum rating is applied last, so fewer
    /// than `limit` spots may come back.
    pub fn recommend(&self, query: &RecommendationQuery) -> Recommendations {
        let category = normalize_input(query.category.as_deref());
        let location = normalize_input(query.location.as_deref());

        tracing::debug!(
            category = ?category,
            location = ?location,
            limit = query.limit,
            "Getting recommendations"
        );

        let mut recommendations =
            match self.rank(category.as_deref(), location.as_deref(), query.limit) {
                Ok(recommendations) => recommendations,
                Err(e) => {
                    tracing::error!(error = %e, "Error getting recommendations, using top rated spots");
                    Recommendations {
                        tier: MatchTier::TopRated,
                        degraded: true,
                        spots: self.top_rated(query.limit),
                    }
                }
            };

        recommendations
            .spots
            .retain(|spot| spot.record.rating >= query.min_rating);

        tracing::debug!(
            tier = ?recommendations.tier,
            returned = recommendations.spots.len(),
            "Returning recommendations"
        );

        recommendations
    }

    /// Highest actually-rated spots of the whole dataset, no prediction
    pub fn top_rated(&self, limit: usize) -> Vec<RankedSpot> {
        self.dataset
            .by_rating_desc()
            .into_iter()
            .take(limit)
            .map(|i| RankedSpot {
                record: self.dataset.records()[i].clone(),
                predicted_rating: None,
            })
            .collect()
    }

    fn rank(
        &self,
        category: Option<&str>,
        location: Option<&str>,
        limit: usize,
    ) -> Result<Recommendations, RecommendError> {
        let Some((tier, matched)) = self.match_tiers(category, location) else {
            tracing::debug!("No matches found, returning top rated spots");
            return Ok(Recommendations {
                tier: MatchTier::TopRated,
                degraded: false,
                spots: self.top_rated(limit),
            });
        };

        let predictions = match self.ranking {
            RankingMode::PerRow => self.predict_each(&matched)?,
            RankingMode::Broadcast => {
                let rating = self.predict_representative(matched[0], category, location)?;
                vec![rating; matched.len()]
            }
        };

        let mut scored: Vec<(usize, f64)> = matched.into_iter().zip(predictions).collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let spots = scored
            .into_iter()
            .take(limit)
            .map(|(i, predicted)| RankedSpot {
                record: self.dataset.records()[i].clone(),
                predicted_rating: Some(predicted),
            })
            .collect();

        Ok(Recommendations {
            tier,
            degraded: false,
            spots,
        })
    }

    /// First non-empty match tier, in fallback order
    fn match_tiers(
        &self,
        category: Option<&str>,
        location: Option<&str>,
    ) -> Option<(MatchTier, Vec<usize>)> {
        if let (Some(category), Some(location)) = (category, location) {
            let matched = self.dataset.match_category_and_location(category, location);
            if !matched.is_empty() {
                return Some((MatchTier::CategoryAndLocation, matched));
            }
        }

        if let Some(category) = category {
            let matched = self.dataset.match_category(category);
            if !matched.is_empty() {
                return Some((MatchTier::Category, matched));
            }
        }

        if let Some(location) = location {
            let matched = self.dataset.match_location(location);
            if !matched.is_empty() {
                return Some((MatchTier::Location, matched));
            }
        }

        None
    }

    fn predict_each(&self, matched: &[usize]) -> Result<Vec<f64>, RecommendError> {
        let mut features = Array2::<f64>::zeros((matched.len(), FEATURE_COUNT));
        for (row, &i) in matched.iter().enumerate() {
            let encoded = self
                .encoders
                .feature_row(&self.dataset.records()[i], None, None)?;
            for (col, value) in encoded.into_iter().enumerate() {
                features[[row, col]] = value;
            }
        }

        self.predict(&features, matched.len())
    }

    /// Scores one spot, with the user's inputs replacing its category and state
    fn predict_representative(
        &self,
        index: usize,
        category: Option<&str>,
        location: Option<&str>,
    ) -> Result<f64, RecommendError> {
        let encoded =
            self.encoders
                .feature_row(&self.dataset.records()[index], category, location)?;
        let features = Array2::from_shape_vec((1, FEATURE_COUNT), encoded.to_vec())
            .map_err(|e| ModelError::Invalid(e.to_string()))?;

        Ok(self.predict(&features, 1)?[0])
    }

    fn predict(&self, features: &Array2<f64>, expected: usize) -> Result<Vec<f64>, RecommendError> {
        let predictions = self.model.predict(features)?;

        if predictions.len() != expected {
            return Err(RecommendError::PredictionCount {
                expected,
                actual: predictions.len(),
            });
        }
        if predictions.iter().any(|p| !p.is_finite()) {
            return Err(RecommendError::NonFinitePrediction);
        }

        Ok(predictions.to_vec())
    }
}

/// Trimmed, lowercased input; blank means absent
fn normalize_input(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}
