use std::path::Path;

use serde::{Deserialize, Serialize};

/// Columns that must be present in any dataset file
pub const REQUIRED_COLUMNS: [&str; 11] = [
    "State",
    "Place",
    "Category",
    "Hotels Nearby",
    "Travel Vehicles Available",
    "Rating",
    "Best Time to Visit",
    "Family Friendly",
    "Activities",
    "Budget Level",
    "Trip Duration (days)",
];

/// Errors raised while reading or writing a dataset file
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Required column '{0}' not found in the dataset")]
    MissingColumn(String),
}

/// One row of the recommendation dataset.
///
/// Field names serialize to the dataset's CSV headers so the same type is
/// used for loading, the processed export and the spot mirror.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpotRecord {
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Place")]
    pub place: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Activities")]
    pub activities: String,
    #[serde(rename = "Best Time to Visit")]
    pub best_time_to_visit: String,
    #[serde(rename = "Budget Level")]
    pub budget_level: String,
    #[serde(rename = "Family Friendly")]
    pub family_friendly: String,
    #[serde(rename = "Hotels Nearby")]
    pub hotels_nearby: String,
    #[serde(rename = "Travel Vehicles Available")]
    pub travel_vehicles_available: String,
    #[serde(rename = "Trip Duration (days)")]
    pub trip_duration_days: f64,
    #[serde(rename = "Rating")]
    pub rating: f64,
}

/// Raw row as it appears on disk, before normalization
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "State")]
    state: Option<String>,
    #[serde(rename = "Place")]
    place: Option<String>,
    #[serde(rename = "Category")]
    category: Option<String>,
    #[serde(rename = "Activities")]
    activities: Option<String>,
    #[serde(rename = "Best Time to Visit")]
    best_time_to_visit: Option<String>,
    #[serde(rename = "Budget Level")]
    budget_level: Option<String>,
    #[serde(rename = "Family Friendly")]
    family_friendly: Option<String>,
    #[serde(rename = "Hotels Nearby")]
    hotels_nearby: Option<String>,
    #[serde(rename = "Travel Vehicles Available")]
    travel_vehicles_available: Option<String>,
    #[serde(rename = "Trip Duration (days)")]
    trip_duration_days: Option<String>,
    #[serde(rename = "Rating")]
    rating: Option<String>,
}

impl From<RawRecord> for SpotRecord {
    fn from(raw: RawRecord) -> Self {
        Self {
            state: normalize_text(raw.state),
            place: normalize_text(raw.place),
            category: normalize_text(raw.category),
            activities: normalize_text(raw.activities),
            best_time_to_visit: normalize_text(raw.best_time_to_visit),
            budget_level: normalize_text(raw.budget_level),
            family_friendly: normalize_text(raw.family_friendly),
            hotels_nearby: normalize_text(raw.hotels_nearby),
            travel_vehicles_available: normalize_text(raw.travel_vehicles_available),
            trip_duration_days: parse_number(raw.trip_duration_days),
            rating: parse_number(raw.rating),
        }
    }
}

/// Missing text becomes empty, everything is lowercased for matching
fn normalize_text(value: Option<String>) -> String {
    value.map(|v| v.trim().to_lowercase()).unwrap_or_default()
}

/// Unparseable or non-finite numbers are coerced to zero
fn parse_number(value: Option<String>) -> f64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// The in-memory recommendation dataset, normalized at load time
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<SpotRecord>,
}

impl Dataset {
    /// Builds a dataset from already-normalized records
    pub fn new(records: Vec<SpotRecord>) -> Self {
        Self { records }
    }

    /// Loads and normalizes a dataset from a CSV file
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let file = std::fs::File::open(path).map_err(|source| DatasetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_reader(file)
    }

    /// Loads and normalizes a dataset from any CSV source
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, DatasetError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(DatasetError::MissingColumn(column.to_string()));
            }
        }

        let records = csv_reader
            .deserialize::<RawRecord>()
            .map(|row| row.map(SpotRecord::from))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(spots = records.len(), "Loaded recommendation dataset");

        Ok(Self { records })
    }

    /// Writes the dataset with its canonical column layout
    pub fn write(&self, path: &Path) -> Result<(), DatasetError> {
        write_records(path, &self.records)
    }

    pub fn records(&self) -> &[SpotRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Indices of records whose category contains `needle`
    pub fn match_category(&self, needle: &str) -> Vec<usize> {
        self.matching(|r| r.category.contains(needle))
    }

    /// Indices of records whose state contains `needle`
    pub fn match_location(&self, needle: &str) -> Vec<usize> {
        self.matching(|r| r.state.contains(needle))
    }

    /// Indices of records matching both category and location
    pub fn match_category_and_location(&self, category: &str, location: &str) -> Vec<usize> {
        self.matching(|r| r.category.contains(category) && r.state.contains(location))
    }

    /// Indices of the whole dataset ordered by actual rating, highest first.
    ///
    /// The sort is stable so equal ratings keep file order.
    pub fn by_rating_desc(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.records.len()).collect();
        indices.sort_by(|&a, &b| {
            self.records[b]
                .rating
                .total_cmp(&self.records[a].rating)
        });
        indices
    }

    fn matching<F>(&self, predicate: F) -> Vec<usize>
    where
        F: Fn(&SpotRecord) -> bool,
    {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| predicate(record))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Writes records as CSV with the dataset headers, creating parent directories
pub fn write_records(path: &Path, records: &[SpotRecord]) -> Result<(), DatasetError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| DatasetError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush().map_err(|source| DatasetError::Io {
        path: path.display().to_string(),
        source,
    })?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Small dataset used across the recommender tests
    pub fn sample_dataset() -> Dataset {
        let csv = "\
State,Place,Category,Activities,Best Time to Visit,Budget Level,Family Friendly,Hotels Nearby,Travel Vehicles Available,Trip Duration (days),Rating
Goa,Baga Beach,Beach,Water Sports,Winter,Medium,Yes,Many,Bus,3,4.2
Goa,Fort Aguada,Historical,Sightseeing,Winter,Low,Yes,Some,Taxi,1,4.6
Kerala,Varkala Beach,Beach,Surfing,Summer,Low,Yes,Some,Train,2,3.9
Kerala,Munnar,Hill Station,Trekking,Monsoon,High,No,Many,Car,4,4.8
Rajasthan,Amber Fort,Historical,Sightseeing,Winter,Medium,Yes,Many,Car,2,4.5
";
        Dataset::from_reader(csv.as_bytes()).expect("fixture dataset parses")
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::sample_dataset;
    use super::*;

    #[test]
    fn test_load_lowercases_text_columns() {
        let dataset = sample_dataset();
        let first = &dataset.records()[0];
        assert_eq!(first.state, "goa");
        assert_eq!(first.place, "baga beach");
        assert_eq!(first.category, "beach");
        assert_eq!(first.family_friendly, "yes");
        assert_eq!(dataset.len(), 5);
    }

    #[test]
    fn test_load_coerces_bad_numbers_to_zero() {
        let csv = "\
State,Place,Category,Activities,Best Time to Visit,Budget Level,Family Friendly,Hotels Nearby,Travel Vehicles Available,Trip Duration (days),Rating
Goa,Somewhere,,,,,,,,two,n/a
";
        let dataset = Dataset::from_reader(csv.as_bytes()).unwrap();
        let record = &dataset.records()[0];
        assert_eq!(record.rating, 0.0);
        assert_eq!(record.trip_duration_days, 0.0);
        assert_eq!(record.category, "");
    }

    #[test]
    fn test_load_rejects_missing_column() {
        let csv = "State,Place,Category\nGoa,Baga,Beach\n";
        let err = Dataset::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, DatasetError::MissingColumn(ref c) if c == "Hotels Nearby"));
    }

    #[test]
    fn test_substring_matching() {
        let dataset = sample_dataset();
        assert_eq!(dataset.match_category("beach"), vec![0, 2]);
        assert_eq!(dataset.match_category("hist"), vec![1, 4]);
        assert_eq!(dataset.match_location("ker"), vec![2, 3]);
        assert_eq!(dataset.match_category_and_location("beach", "goa"), vec![0]);
        assert!(dataset.match_category_and_location("hill", "goa").is_empty());
    }

    #[test]
    fn test_by_rating_desc() {
        let dataset = sample_dataset();
        assert_eq!(dataset.by_rating_desc(), vec![3, 1, 4, 0, 2]);
    }

    #[test]
    fn test_write_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("processed.csv");

        let dataset = sample_dataset();
        dataset.write(&path).unwrap();

        let reloaded = Dataset::load(&path).unwrap();
        assert_eq!(reloaded.records(), dataset.records());
    }
}
