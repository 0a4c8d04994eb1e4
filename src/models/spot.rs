use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A tourist spot submitted by a user
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct TouristSpot {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub location: String,
    pub category: String,
    pub rating: f64,
    pub image_url: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

/// A validated spot ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewSpot {
    pub name: String,
    pub description: String,
    pub location: String,
    pub category: String,
    pub rating: f64,
    pub image_url: String,
}

impl NewSpot {
    /// Validates submitted form values.
    ///
    /// Every field must be non-blank and the rating must parse as a finite
    /// number; its range is not constrained.
    pub fn parse(
        name: &str,
        description: &str,
        location: &str,
        category: &str,
        rating: &str,
        image_url: &str,
    ) -> Result<Self, String> {
        let fields = [
            ("name", name),
            ("description", description),
            ("location", location),
            ("category", category),
            ("rating", rating),
            ("image_url", image_url),
        ];
        if let Some((field, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(format!("Field '{}' is required", field));
        }

        let rating = rating
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|r| r.is_finite())
            .ok_or_else(|| "Rating must be a number".to_string())?;

        Ok(Self {
            name: name.trim().to_string(),
            description: description.trim().to_string(),
            location: location.trim().to_string(),
            category: category.trim().to_string(),
            rating,
            image_url: image_url.trim().to_string(),
        })
    }
}
