use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::IntoResponse,
    Extension, Form, Json,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::session::{session_cookie, session_cookie_removal};
use super::{AppState, CurrentUser};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::middleware::RequestId;
use crate::models::{NewSpot, TouristSpot, User};
use crate::services::auth::{self, Registration};
use crate::services::export;
use crate::services::recommender::{MatchTier, RankedSpot, RecommendationQuery};

/// Shown whenever the dashboard form cannot be turned into a query
pub const RECOMMENDATION_ERROR: &str =
    "An error occurred while getting recommendations. Please try again.";

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Dashboard search form; numbers arrive as text and blank means default
#[derive(Debug, Default, Deserialize)]
pub struct DashboardForm {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub min_rating: String,
    #[serde(default)]
    pub num_recommendations: String,
}

#[derive(Debug, Deserialize)]
pub struct AddSpotForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub rating: String,
    #[serde(default)]
    pub image_url: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub place: String,
    pub state: String,
    pub category: String,
    pub activities: String,
    pub best_time_to_visit: String,
    pub budget_level: String,
    pub family_friendly: String,
    pub hotels_nearby: String,
    pub travel_vehicles_available: String,
    pub trip_duration_days: f64,
    pub rating: f64,
    pub predicted_rating: Option<f64>,
}

impl From<&RankedSpot> for RecommendationResponse {
    fn from(spot: &RankedSpot) -> Self {
        let record = &spot.record;
        Self {
            place: record.place.clone(),
            state: record.state.clone(),
            category: record.category.clone(),
            activities: record.activities.clone(),
            best_time_to_visit: record.best_time_to_visit.clone(),
            budget_level: record.budget_level.clone(),
            family_friendly: record.family_friendly.clone(),
            hotels_nearby: record.hotels_nearby.clone(),
            travel_vehicles_available: record.travel_vehicles_available.clone(),
            trip_duration_days: record.trip_duration_days,
            rating: record.rating,
            predicted_rating: spot.predicted_rating,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub username: String,
    pub recommendations: Vec<RecommendationResponse>,
    pub match_tier: Option<MatchTier>,
    pub error_message: Option<String>,
    pub spots: Vec<TouristSpot>,
}

// Handlers

/// Landing document listing the available routes
pub async fn index() -> Json<Value> {
    Json(json!({
        "name": "Tourist Spots",
        "routes": ["/register", "/login", "/logout", "/dashboard", "/add_spot"]
    }))
}

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}

/// Registers a new account
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let registration = Registration {
        username: form.username.trim(),
        email: form.email.trim(),
        password: &form.password,
        confirm_password: &form.confirm_password,
    };
    registration
        .validate()
        .map_err(|msg| AppError::InvalidInput(msg.to_string()))?;

    if db::users::find_by_username(&state.db, registration.username)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict("Username already exists".to_string()));
    }

    let password_hash = auth::hash_password(registration.password)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    let user = db::users::create(
        &state.db,
        registration.username,
        registration.email,
        &password_hash,
    )
    .await?;

    tracing::info!(user_id = user.id, username = %user.username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful! Please login.",
            "user": UserResponse::from(&user),
        })),
    ))
}

/// Verifies credentials and opens a session
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> AppResult<impl IntoResponse> {
    let user = db::users::find_by_username(&state.db, form.username.trim())
        .await?
        .filter(|user| auth::verify_password(&form.password, &user.password_hash));

    let Some(user) = user else {
        tracing::info!(username = %form.username, "Rejected login");
        return Err(AppError::Unauthorized(
            "Invalid username or password".to_string(),
        ));
    };

    let session_id = state.sessions.create(&user).await;
    tracing::info!(user_id = user.id, "User logged in");

    Ok((
        jar.add(session_cookie(session_id)),
        Json(json!({
            "message": "Logged in",
            "user": UserResponse::from(&user),
        })),
    ))
}

/// Ends the current session
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    user: CurrentUser,
) -> impl IntoResponse {
    state.sessions.remove(&user.session_id).await;
    tracing::info!(user_id = user.user_id, "User logged out");

    (
        jar.remove(session_cookie_removal()),
        Json(json!({ "message": "Logged out" })),
    )
}

/// Dashboard without a search
pub async fn dashboard(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<DashboardResponse>> {
    let spots = db::spots::list_all(&state.db).await?;

    Ok(Json(DashboardResponse {
        username: user.username,
        recommendations: Vec::new(),
        match_tier: None,
        error_message: None,
        spots,
    }))
}

/// Dashboard search: runs the recommender for the submitted form
pub async fn dashboard_search(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    user: CurrentUser,
    Form(form): Form<DashboardForm>,
) -> AppResult<Json<DashboardResponse>> {
    let spots = db::spots::list_all(&state.db).await?;

    let query = match parse_dashboard_form(&form, state.config.default_recommendations) {
        Ok(query) => query,
        Err(reason) => {
            tracing::warn!(request_id = %request_id, reason, "Invalid dashboard form");
            return Ok(Json(DashboardResponse {
                username: user.username,
                recommendations: Vec::new(),
                match_tier: None,
                error_message: Some(RECOMMENDATION_ERROR.to_string()),
                spots,
            }));
        }
    };

    tracing::info!(
        request_id = %request_id,
        user_id = user.user_id,
        category = ?query.category,
        location = ?query.location,
        "Processing recommendation request"
    );

    let result = state.recommender.recommend(&query);

    tracing::info!(
        request_id = %request_id,
        tier = ?result.tier,
        degraded = result.degraded,
        count = result.spots.len(),
        "Recommendations served"
    );

    Ok(Json(DashboardResponse {
        username: user.username,
        recommendations: result.spots.iter().map(RecommendationResponse::from).collect(),
        match_tier: Some(result.tier),
        error_message: None,
        spots,
    }))
}

/// Stores a submitted spot and refreshes the CSV mirror
pub async fn add_spot(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<AddSpotForm>,
) -> AppResult<(StatusCode, Json<TouristSpot>)> {
    let new_spot = NewSpot::parse(
        &form.name,
        &form.description,
        &form.location,
        &form.category,
        &form.rating,
        &form.image_url,
    )
    .map_err(AppError::InvalidInput)?;

    let spot = db::spots::create(&state.db, user.user_id, &new_spot).await?;
    tracing::info!(spot_id = spot.id, user_id = user.user_id, "Tourist spot added");

    if let Err(e) = export::export_spots(&state.db, &state.config.spots_export_path).await {
        tracing::warn!(error = %e, "Spot saved but export refresh failed");
    }

    Ok((StatusCode::CREATED, Json(spot)))
}

/// Turns the dashboard form into a query.
///
/// Blank category/location mean "any"; blank numbers take their defaults.
pub fn parse_dashboard_form(
    form: &DashboardForm,
    default_count: usize,
) -> Result<RecommendationQuery, &'static str> {
    let min_rating = match form.min_rating.trim() {
        "" => 0.0,
        raw => raw
            .parse::<f64>()
            .ok()
            .filter(|r| r.is_finite())
            .ok_or("min_rating is not a number")?,
    };

    let limit = match form.num_recommendations.trim() {
        "" => default_count,
        raw => raw
            .parse::<usize>()
            .map_err(|_| "num_recommendations is not a count")?,
    };

    let optional = |value: &str| {
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    };

    Ok(
        RecommendationQuery::new(optional(&form.category), optional(&form.location))
            .with_min_rating(min_rating)
            .with_limit(limit),
    )
}
