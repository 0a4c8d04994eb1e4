use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::dataset::{Dataset, SpotRecord};

/// Categorical columns in the order the model expects them
pub const CATEGORICAL_COLUMNS: [&str; 8] = [
    "Category",
    "State",
    "Activities",
    "Best Time to Visit",
    "Budget Level",
    "Family Friendly",
    "Hotels Nearby",
    "Travel Vehicles Available",
];

/// Numeric column appended after the encoded categoricals
pub const NUMERIC_COLUMN: &str = "Trip Duration (days)";

/// Total width of a feature vector
pub const FEATURE_COUNT: usize = CATEGORICAL_COLUMNS.len() + 1;

#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("No encoder stored for column '{0}'")]
    MissingEncoder(String),

    #[error("Encoder for column '{0}' has no known classes")]
    EmptyEncoder(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoder for column '{0}' lists classes out of order or twice")]
    UnsortedClasses(String),

    #[error("Invalid encoder file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Maps a lowercase category string to its integer code.
///
/// Classes are kept sorted so a class's code is its position, matching the
/// layout the model was trained against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Builds an encoder from any set of class names
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes: BTreeSet<String> = classes.into_iter().map(Into::into).collect();
        Self {
            classes: classes.into_iter().collect(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Whether classes are strictly ascending, which codes rely on
    pub fn is_sorted(&self) -> bool {
        self.classes.windows(2).all(|pair| pair[0] < pair[1])
    }

    /// Code for a known class
    pub fn code_of(&self, value: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(value)).ok()
    }

    /// Encodes a value, mapping unknown values to the first known class
    pub fn encode(&self, value: &str) -> Option<usize> {
        if self.classes.is_empty() {
            return None;
        }
        let value = value.to_lowercase();
        Some(self.code_of(&value).unwrap_or(0))
    }
}

/// One label encoder per categorical column, persisted alongside the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncoderSet {
    encoders: BTreeMap<String, LabelEncoder>,
}

impl EncoderSet {
    pub fn new(encoders: BTreeMap<String, LabelEncoder>) -> Self {
        Self { encoders }
    }

    /// Fits one encoder per categorical column from the dataset's values
    pub fn fit(dataset: &Dataset) -> Self {
        let encoders = CATEGORICAL_COLUMNS
            .iter()
            .map(|&column| {
                let values = dataset
                    .records()
                    .iter()
                    .map(|record| categorical_value(record, column).to_string());
                (column.to_string(), LabelEncoder::new(values))
            })
            .collect();
        Self { encoders }
    }

    /// Loads encoders from their JSON file
    pub fn load(path: &Path) -> Result<Self, EncodingError> {
        let raw = std::fs::read_to_string(path).map_err(|source| EncodingError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let encoders: Self = serde_json::from_str(&raw)?;

        // codes are positions, so an unsorted file cannot be repaired here
        if let Some((column, _)) = encoders.encoders.iter().find(|(_, e)| !e.is_sorted()) {
            return Err(EncodingError::UnsortedClasses(column.clone()));
        }

        tracing::info!(columns = encoders.encoders.len(), "Loaded label encoders");

        Ok(encoders)
    }

    /// Writes encoders as JSON
    pub fn save(&self, path: &Path) -> Result<(), EncodingError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| EncodingError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn get(&self, column: &str) -> Option<&LabelEncoder> {
        self.encoders.get(column)
    }

    /// Encodes a single value of a categorical column
    pub fn encode(&self, column: &str, value: &str) -> Result<usize, EncodingError> {
        let encoder = self
            .encoders
            .get(column)
            .ok_or_else(|| EncodingError::MissingEncoder(column.to_string()))?;

        let code = encoder
            .encode(value)
            .ok_or_else(|| EncodingError::EmptyEncoder(column.to_string()))?;

        if encoder.code_of(&value.to_lowercase()).is_none() {
            tracing::debug!(column, value, "Unknown category, using first known class");
        }

        Ok(code)
    }

    /// Builds the model's feature row for a record.
    ///
    /// `category` and `state` replace the record's own values when given.
    pub fn feature_row(
        &self,
        record: &SpotRecord,
        category: Option<&str>,
        state: Option<&str>,
    ) -> Result<[f64; FEATURE_COUNT], EncodingError> {
        let mut row = [0.0; FEATURE_COUNT];

        for (i, &column) in CATEGORICAL_COLUMNS.iter().enumerate() {
            let value = match column {
                "Category" => category.unwrap_or(&record.category),
                "State" => state.unwrap_or(&record.state),
                _ => categorical_value(record, column),
            };
            row[i] = self.encode(column, value)? as f64;
        }
        row[FEATURE_COUNT - 1] = record.trip_duration_days;

        Ok(row)
    }
}

/// Value of a categorical column on a record
fn categorical_value<'a>(record: &'a SpotRecord, column: &str) -> &'a str {
    match column {
        "Category" => &record.category,
        "State" => &record.state,
        "Activities" => &record.activities,
        "Best Time to Visit" => &record.best_time_to_visit,
        "Budget Level" => &record.budget_level,
        "Family Friendly" => &record.family_friendly,
        "Hotels Nearby" => &record.hotels_nearby,
        "Travel Vehicles Available" => &record.travel_vehicles_available,
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::super::dataset::fixtures::sample_dataset;
    use super::*;

    #[test]
    fn test_classes_are_sorted_and_deduplicated() {
        let encoder = LabelEncoder::new(["kerala", "goa", "kerala", "assam"]);
        assert_eq!(encoder.classes(), &["assam", "goa", "kerala"]);
        assert_eq!(encoder.encode("goa"), Some(1));
    }

    #[test]
    fn test_encode_is_case_insensitive() {
        let encoder = LabelEncoder::new(["beach", "historical"]);
        assert_eq!(encoder.encode("Historical"), Some(1));
    }

    #[test]
    fn test_unknown_value_maps_to_first_class() {
        let encoder = LabelEncoder::new(["beach", "historical"]);
        assert_eq!(encoder.encode("volcano"), Some(0));

        let set = EncoderSet::fit(&sample_dataset());
        assert_eq!(set.encode("Category", "volcano").unwrap(), 0);
    }

    #[test]
    fn test_missing_and_empty_encoders_fail() {
        let set = EncoderSet::new(BTreeMap::from([(
            "Category".to_string(),
            LabelEncoder::new(Vec::<String>::new()),
        )]));

        assert!(matches!(
            set.encode("Category", "beach"),
            Err(EncodingError::EmptyEncoder(_))
        ));
        assert!(matches!(
            set.encode("State", "goa"),
            Err(EncodingError::MissingEncoder(_))
        ));
    }

    #[test]
    fn test_fit_covers_every_categorical_column() {
        let set = EncoderSet::fit(&sample_dataset());
        for column in CATEGORICAL_COLUMNS {
            assert!(set.get(column).is_some(), "missing encoder for {column}");
        }
        assert_eq!(
            set.get("State").unwrap().classes(),
            &["goa", "kerala", "rajasthan"]
        );
    }

    #[test]
    fn test_feature_row_uses_overrides() {
        let dataset = sample_dataset();
        let set = EncoderSet::fit(&dataset);
        let record = &dataset.records()[0];

        let own = set.feature_row(record, None, None).unwrap();
        // beach, goa
        assert_eq!(own[0], 0.0);
        assert_eq!(own[1], 0.0);
        assert_eq!(own[FEATURE_COUNT - 1], 3.0);

        let overridden = set
            .feature_row(record, Some("historical"), Some("kerala"))
            .unwrap();
        assert_eq!(overridden[0], 2.0);
        assert_eq!(overridden[1], 1.0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("label_encoders.json");

        let set = EncoderSet::fit(&sample_dataset());
        set.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["State"][0], "goa");

        assert_eq!(EncoderSet::load(&path).unwrap(), set);
    }

    #[test]
    fn test_load_rejects_unsorted_classes() {
        let dir = tempfile::tempdir().unwrap();

        let unsorted = dir.path().join("unsorted.json");
        std::fs::write(&unsorted, r#"{"State": ["kerala", "goa", "assam"]}"#).unwrap();
        assert!(matches!(
            EncoderSet::load(&unsorted),
            Err(EncodingError::UnsortedClasses(column)) if column == "State"
        ));

        let duplicated = dir.path().join("duplicated.json");
        std::fs::write(&duplicated, r#"{"State": ["goa", "goa", "kerala"]}"#).unwrap();
        assert!(matches!(
            EncoderSet::load(&duplicated),
            Err(EncodingError::UnsortedClasses(_))
        ));
    }
}
