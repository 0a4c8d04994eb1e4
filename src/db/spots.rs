use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::AppResult;
use crate::models::{NewSpot, TouristSpot};

const SPOT_COLUMNS: &str =
    "id, name, description, location, category, rating, image_url, user_id, created_at";

/// Stores a spot owned by `user_id`
pub async fn create(pool: &SqlitePool, user_id: i64, spot: &NewSpot) -> AppResult<TouristSpot> {
    let created = sqlx::query_as::<_, TouristSpot>(&format!(
        "INSERT INTO tourist_spots \
         (name, description, location, category, rating, image_url, user_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {SPOT_COLUMNS}"
    ))
    .bind(&spot.name)
    .bind(&spot.description)
    .bind(&spot.location)
    .bind(&spot.category)
    .bind(spot.rating)
    .bind(&spot.image_url)
    .bind(user_id)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(created)
}

/// All spots, oldest first
pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<TouristSpot>> {
    let spots = sqlx::query_as::<_, TouristSpot>(&format!(
        "SELECT {SPOT_COLUMNS} FROM tourist_spots ORDER BY id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(spots)
}
