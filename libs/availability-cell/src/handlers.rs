use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{NaiveDate, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::profiles::ProfileLookup;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::pagination::PageParams;
use shared_utils::extractor::{optional_user, user_uuid};

use crate::models::{AvailabilityError, AvailabilityUpdateRequest, SlotView};
use crate::services::{AvailabilityService, ScheduleAggregator, SlotStore};

const SCHEDULE_PAGE_SIZE: u32 = 30;
const DOCTORS_PAGE_SIZE: u32 = 10;

/// Router state shared by every availability handler.
#[derive(Clone)]
pub struct AvailabilityState {
    pub config: Arc<AppConfig>,
    pub slots: Arc<dyn SlotStore>,
    pub profiles: Arc<dyn ProfileLookup>,
}

impl AvailabilityState {
    fn service(&self) -> AvailabilityService {
        AvailabilityService::new(self.slots.clone(), self.profiles.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct MySlotsQuery {
    pub date: Option<String>,
}

pub(crate) fn to_app_error(err: AvailabilityError) -> AppError {
    match err {
        AvailabilityError::ValidationError(msg) => AppError::ValidationError(msg),
        AvailabilityError::SlotNotFound(_) => AppError::NotFound("Availability slot not found".to_string()),
        AvailabilityError::SlotsBooked(ids) => {
            let ids = ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(", ");
            AppError::Conflict(format!("Cannot remove booked slots: {}", ids))
        }
        AvailabilityError::StorageUnavailable(detail) => {
            error!("Availability storage failure: {}", detail);
            AppError::Internal("Storage is temporarily unavailable".to_string())
        }
    }
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::ValidationError(format!("Invalid {} format", what)))
}

fn require_doctor(user: &User) -> Result<Uuid, AppError> {
    if !user.is_doctor() {
        return Err(AppError::Forbidden("Only doctors can manage availability".to_string()));
    }
    user_uuid(user)
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_doctor_schedule_groups(
    State(state): State<AvailabilityState>,
    Path(doctor_id): Path<String>,
    Query(params): Query<PageParams>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = parse_id(&doctor_id, "doctor ID")?;
    let page = params.resolve(SCHEDULE_PAGE_SIZE).map_err(AppError::ValidationError)?;

    let token = auth.as_ref().map(|TypedHeader(a)| a.token());
    let patient_id = match optional_user(token, &state.config)? {
        Some(user) => Some(user_uuid(&user)?),
        None => None,
    };

    let result = ScheduleAggregator::new(state.slots.clone())
        .schedule_groups(doctor_id, patient_id, page, Utc::now())
        .await
        .map_err(to_app_error)?;

    let message = if result.schedule_groups.is_empty() {
        "No available schedule groups found"
    } else {
        "Schedule groups retrieved successfully"
    };

    Ok(Json(json!({
        "success": true,
        "message": message,
        "scheduleGroups": result.schedule_groups,
        "pagination": result.pagination,
    })))
}

#[axum::debug_handler]
pub async fn get_available_doctors(
    State(state): State<AvailabilityState>,
    Query(params): Query<PageParams>,
) -> Result<Json<Value>, AppError> {
    let page = params.resolve(DOCTORS_PAGE_SIZE).map_err(AppError::ValidationError)?;

    let result = state.service()
        .available_doctors(page, Utc::now())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Available doctors retrieved successfully",
        "availableDoctors": result.available_doctors,
        "pagination": result.pagination,
    })))
}

// ==============================================================================
// DOCTOR HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn update_availability(
    State(state): State<AvailabilityState>,
    Extension(user): Extension<User>,
    Json(request): Json<AvailabilityUpdateRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = require_doctor(&user)?;

    let slots = state.service()
        .update_availability(doctor_id, request)
        .await
        .map_err(to_app_error)?;

    let slots: Vec<SlotView> = slots.into_iter().map(SlotView::from).collect();

    Ok(Json(json!({
        "success": true,
        "message": "Availability updated successfully",
        "slots": slots,
    })))
}

#[axum::debug_handler]
pub async fn get_my_slots(
    State(state): State<AvailabilityState>,
    Extension(user): Extension<User>,
    Query(query): Query<MySlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = require_doctor(&user)?;

    let date = query.date
        .as_deref()
        .map(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .transpose()
        .map_err(|_| AppError::ValidationError("Date must be formatted as YYYY-MM-DD".to_string()))?;

    let slots = state.service()
        .my_slots(doctor_id, date)
        .await
        .map_err(to_app_error)?;

    let slots: Vec<SlotView> = slots.into_iter().map(SlotView::from).collect();

    Ok(Json(json!({
        "success": true,
        "message": "Slots retrieved successfully",
        "slots": slots,
    })))
}
