//! Driver vehicle registration endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::{CreateVehicleRequest, UpdateVehicleRequest, User, UserRole, Vehicle};
use crate::AppState;

use super::error::ApiError;

fn current_year() -> i64 {
    use chrono::Datelike;
    chrono::Utc::now().year() as i64
}

fn validate_vehicle_year(year: i64) -> Result<(), ApiError> {
    if !(1980..=current_year() + 1).contains(&year) {
        return Err(ApiError::validation_field(
            "year",
            format!("Year must be between 1980 and {}", current_year() + 1),
        ));
    }
    Ok(())
}

/// Register a vehicle. Drivers only.
pub async fn create_vehicle(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateVehicleRequest>,
) -> Result<(StatusCode, Json<Vehicle>), ApiError> {
    if user.get_role() != UserRole::Driver {
        return Err(ApiError::forbidden("Only drivers register vehicles"));
    }
    if req.make.trim().is_empty() || req.model.trim().is_empty() {
        return Err(ApiError::bad_request("Make and model are required"));
    }
    if req.plate_number.trim().is_empty() {
        return Err(ApiError::validation_field("plate_number", "Plate number is required"));
    }
    validate_vehicle_year(req.year)?;
    if !(1..=16).contains(&req.capacity) {
        return Err(ApiError::validation_field("capacity", "Capacity must be between 1 and 16"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO vehicles (id, driver_id, make, model, year, color, plate_number, capacity, \
         registration_url, insurance_url, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&user.id)
    .bind(req.make.trim())
    .bind(req.model.trim())
    .bind(req.year)
    .bind(req.color.trim())
    .bind(req.plate_number.trim().to_uppercase())
    .bind(req.capacity)
    .bind(&req.registration_url)
    .bind(&req.insurance_url)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let vehicle = Vehicle::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::internal("Vehicle vanished after insert"))?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

/// The caller's vehicles
pub async fn my_vehicles(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<Vehicle>>, ApiError> {
    let vehicles = Vehicle::list_for_driver(&state.db, &user.id).await?;
    Ok(Json(vehicles))
}

/// A driver's vehicles, for passengers vetting an offer and for admins
pub async fn driver_vehicles(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(driver_id): Path<String>,
) -> Result<Json<Vec<Vehicle>>, ApiError> {
    let vehicles = Vehicle::list_for_driver(&state.db, &driver_id).await?;
    Ok(Json(vehicles))
}

/// Update a vehicle. Owner or admin.
pub async fn update_vehicle(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateVehicleRequest>,
) -> Result<Json<Vehicle>, ApiError> {
    let vehicle = Vehicle::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Vehicle not found"))?;
    if vehicle.driver_id != user.id && !user.is_admin() {
        return Err(ApiError::forbidden("Not your vehicle"));
    }
    if let Some(year) = req.year {
        validate_vehicle_year(year)?;
    }
    if let Some(capacity) = req.capacity {
        if !(1..=16).contains(&capacity) {
            return Err(ApiError::validation_field("capacity", "Capacity must be between 1 and 16"));
        }
    }

    sqlx::query(
        "UPDATE vehicles SET make = ?, model = ?, year = ?, color = ?, plate_number = ?, \
         capacity = ?, registration_url = ?, insurance_url = ?, updated_at = ? WHERE id = ?",
    )
    .bind(req.make.as_deref().map(str::trim).unwrap_or(&vehicle.make))
    .bind(req.model.as_deref().map(str::trim).unwrap_or(&vehicle.model))
    .bind(req.year.unwrap_or(vehicle.year))
    .bind(req.color.as_deref().map(str::trim).unwrap_or(&vehicle.color))
    .bind(
        req.plate_number
            .as_deref()
            .map(|p| p.trim().to_uppercase())
            .unwrap_or_else(|| vehicle.plate_number.clone()),
    )
    .bind(req.capacity.unwrap_or(vehicle.capacity))
    .bind(req.registration_url.as_deref().or(vehicle.registration_url.as_deref()))
    .bind(req.insurance_url.as_deref().or(vehicle.insurance_url.as_deref()))
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await?;

    let updated = Vehicle::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Vehicle not found"))?;
    Ok(Json(updated))
}

/// Delete a vehicle. Owner or admin.
pub async fn delete_vehicle(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let vehicle = Vehicle::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Vehicle not found"))?;
    if vehicle.driver_id != user.id && !user.is_admin() {
        return Err(ApiError::forbidden("Not your vehicle"));
    }

    Vehicle::delete(&state.db, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
