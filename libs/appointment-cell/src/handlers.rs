// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use availability_cell::services::SlotStore;
use shared_config::AppConfig;
use shared_database::profiles::ProfileLookup;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::pagination::PageParams;
use shared_utils::extractor::user_uuid;

use crate::models::{AppointmentError, BookAppointmentRequest, BookingAction};
use crate::services::{AppointmentDirectory, AppointmentStore, BookingCoordinator};

const APPOINTMENTS_PAGE_SIZE: u32 = 10;

#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub slots: Arc<dyn SlotStore>,
    pub appointments: Arc<dyn AppointmentStore>,
    pub profiles: Arc<dyn ProfileLookup>,
}

impl AppointmentState {
    fn coordinator(&self) -> BookingCoordinator {
        BookingCoordinator::new(self.slots.clone(), self.appointments.clone())
    }

    fn directory(&self) -> AppointmentDirectory {
        AppointmentDirectory::new(self.slots.clone(), self.appointments.clone(), self.profiles.clone())
    }
}

pub(crate) fn to_app_error(err: AppointmentError) -> AppError {
    match err {
        AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
        AppointmentError::SlotNotFound | AppointmentError::NotFoundOrForbidden => {
            AppError::NotFound(err.to_string())
        }
        AppointmentError::DoctorMismatch | AppointmentError::PastAppointment => {
            AppError::BadRequest(err.to_string())
        }
        AppointmentError::SlotUnavailable { .. }
        | AppointmentError::AlreadyCancelled
        | AppointmentError::AlreadyCompleted
        | AppointmentError::ConcurrentModification => AppError::Conflict(err.to_string()),
        AppointmentError::StorageUnavailable(detail) => {
            error!("Appointment storage failure: {}", detail);
            AppError::Internal("Storage is temporarily unavailable".to_string())
        }
    }
}

// ==============================================================================
// PATIENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let (doctor_id, slot_id) = request.validate().map_err(to_app_error)?;
    let patient_id = user_uuid(&user)?;

    info!("Booking request from patient {} for slot {}", patient_id, slot_id);

    let outcome = state.coordinator()
        .book(patient_id, doctor_id, slot_id)
        .await
        .map_err(to_app_error)?;

    let message = match outcome.action {
        BookingAction::Booked => "Appointment booked successfully",
        BookingAction::Rescheduled => "Appointment rescheduled successfully",
    };
    let appointment = state.directory().view(outcome.appointment).await;

    Ok(Json(json!({
        "success": true,
        "message": message,
        "action": outcome.action,
        "appointment": appointment,
        "releasedSlotId": outcome.released_slot,
    })))
}

#[axum::debug_handler]
pub async fn get_my_appointments(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Query(params): Query<PageParams>,
) -> Result<Json<Value>, AppError> {
    let page = params.resolve(APPOINTMENTS_PAGE_SIZE).map_err(AppError::ValidationError)?;
    let patient_id = user_uuid(&user)?;

    let listing = state.directory()
        .patient_appointments(patient_id, page)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointments retrieved successfully",
        "appointments": listing.appointments,
        "totalCount": listing.total_count,
        "pagination": listing.pagination,
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointment_id = Uuid::parse_str(&appointment_id)
        .map_err(|_| AppError::ValidationError("Invalid appointment ID format".to_string()))?;
    let patient_id = user_uuid(&user)?;

    let cancelled = state.coordinator()
        .cancel(appointment_id, patient_id)
        .await
        .map_err(to_app_error)?;

    let appointment = state.directory().view(cancelled).await;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment cancelled successfully",
        "appointment": appointment,
    })))
}

// ==============================================================================
// DOCTOR HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Query(params): Query<PageParams>,
) -> Result<Json<Value>, AppError> {
    if !user.is_doctor() {
        return Err(AppError::Forbidden("Only doctors can view their appointment schedule".to_string()));
    }
    let page = params.resolve(APPOINTMENTS_PAGE_SIZE).map_err(AppError::ValidationError)?;
    let doctor_id = user_uuid(&user)?;

    let listing = state.directory()
        .doctor_appointments(doctor_id, page)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Doctor appointments retrieved successfully",
        "appointments": listing.appointments,
        "totalCount": listing.total_count,
        "pagination": listing.pagination,
    })))
}
