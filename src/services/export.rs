use std::path::Path;

use sqlx::SqlitePool;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::TouristSpot;
use crate::services::recommender::dataset::{write_records, SpotRecord};

/// Flattens a stored spot into the recommendation dataset's layout.
///
/// Columns a submitted spot has no value for stay empty.
impl From<&TouristSpot> for SpotRecord {
    fn from(spot: &TouristSpot) -> Self {
        Self {
            state: spot.location.clone(),
            place: spot.name.clone(),
            category: spot.category.clone(),
            activities: spot.description.clone(),
            best_time_to_visit: String::new(),
            budget_level: String::new(),
            family_friendly: String::new(),
            hotels_nearby: String::new(),
            travel_vehicles_available: String::new(),
            trip_duration_days: 0.0,
            rating: spot.rating,
        }
    }
}

/// Rewrites the CSV mirror of every stored spot
pub async fn export_spots(pool: &SqlitePool, path: &Path) -> AppResult<usize> {
    let spots = db::spots::list_all(pool).await?;
    let records: Vec<SpotRecord> = spots.iter().map(SpotRecord::from).collect();

    write_records(path, &records)
        .map_err(|e| AppError::Internal(format!("Failed to write spot export: {}", e)))?;

    tracing::info!(
        spots = records.len(),
        path = %path.display(),
        "Spot export refreshed"
    );

    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, init_schema, users};
    use crate::models::NewSpot;
    use crate::services::recommender::Dataset;

    #[tokio::test]
    async fn test_export_matches_dataset_layout() {
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        init_schema(&pool).await.unwrap();
        let user = users::create(&pool, "asha", "asha@example.com", "hash")
            .await
            .unwrap();
        let spot = NewSpot::parse("Baga Beach", "Water Sports", "Goa", "Beach", "4.2", "img")
            .unwrap();
        db::spots::create(&pool, user.id, &spot).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export").join("spots.csv");
        assert_eq!(export_spots(&pool, &path).await.unwrap(), 1);

        // the mirror loads back as a dataset, normalized like any other
        let dataset = Dataset::load(&path).unwrap();
        let record = &dataset.records()[0];
        assert_eq!(record.place, "baga beach");
        assert_eq!(record.state, "goa");
        assert_eq!(record.activities, "water sports");
        assert_eq!(record.rating, 4.2);
    }
}
