// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use availability_cell::models::SlotView;
use shared_database::StoreError;
use shared_models::pagination::Pagination;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// Appointment row as stored. Rebooking rewrites `slot_id` in place, so one
/// record per (patient, doctor) carries the whole history of moves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub slot_id: Uuid,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn new_pending(patient_id: Uuid, doctor_id: Uuid, slot_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            patient_id,
            slot_id,
            status: AppointmentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

// ==============================================================================
// BOOKING RESULTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingAction {
    Booked,
    Rescheduled,
}

#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub action: BookingAction,
    pub appointment: Appointment,
    pub slot: SlotView,
    /// Slot given up by a rebooking.
    pub released_slot: Option<Uuid>,
}

/// Why a reservation lost, judged from the slot as re-read after the failed
/// conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotUnavailableReason {
    HeldByRequester,
    HeldByAnotherPatient,
    HolderUnknown,
}

impl fmt::Display for SlotUnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotUnavailableReason::HeldByRequester => write!(f, " (This slot is currently booked by you)"),
            SlotUnavailableReason::HeldByAnotherPatient => write!(f, " (This slot is booked by another patient)"),
            SlotUnavailableReason::HolderUnknown => Ok(()),
        }
    }
}

// ==============================================================================
// API MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAppointmentRequest {
    pub doctor_id: Option<String>,
    pub slot_id: Option<String>,
}

impl BookAppointmentRequest {
    /// Parsed `(doctor_id, slot_id)`.
    pub fn validate(&self) -> Result<(Uuid, Uuid), AppointmentError> {
        let doctor_id = required_id(self.doctor_id.as_deref(), "Doctor ID", "doctor ID")?;
        let slot_id = required_id(self.slot_id.as_deref(), "Slot ID", "slot ID")?;
        Ok((doctor_id, slot_id))
    }
}

fn required_id(raw: Option<&str>, label: &str, lower: &str) -> Result<Uuid, AppointmentError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())
        .ok_or_else(|| AppointmentError::ValidationError(format!("{} is required", label)))?;
    Uuid::parse_str(raw)
        .map_err(|_| AppointmentError::ValidationError(format!("Invalid {} format", lower)))
}

/// Appointment enriched with slot times and display names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentView {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub slot_id: Uuid,
    pub status: AppointmentStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub doctor_name: String,
    pub doctor_specialty: String,
    pub patient_name: String,
    pub patient_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentListPage {
    pub appointments: Vec<AppointmentView>,
    pub total_count: usize,
    pub pagination: Pagination,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Availability slot not found")]
    SlotNotFound,

    #[error("Invalid doctor for this time slot")]
    DoctorMismatch,

    #[error("This time slot is no longer available{reason}")]
    SlotUnavailable { reason: SlotUnavailableReason },

    #[error("Appointment not found or you don't have permission to cancel it")]
    NotFoundOrForbidden,

    #[error("Appointment is already cancelled")]
    AlreadyCancelled,

    #[error("Cannot cancel a completed appointment")]
    AlreadyCompleted,

    #[error("Cannot cancel appointments in the past")]
    PastAppointment,

    #[error("Appointment was changed by another request, please try again")]
    ConcurrentModification,

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        AppointmentError::StorageUnavailable(err.to_string())
    }
}
