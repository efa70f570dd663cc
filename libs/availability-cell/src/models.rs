// libs/availability-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::pagination::Pagination;

// ==============================================================================
// SLOT RECORDS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Booked,
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotStatus::Available => write!(f, "available"),
            SlotStatus::Booked => write!(f, "booked"),
        }
    }
}

/// A time interval a doctor has published. `booked_by` is set exactly when
/// the status is `Booked`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SlotStatus,
    pub booked_by: Option<Uuid>,
}

impl Slot {
    pub fn new_available(doctor_id: Uuid, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            start_time,
            end_time,
            status: SlotStatus::Available,
            booked_by: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == SlotStatus::Available
    }

    pub fn is_held_by(&self, patient_id: Uuid) -> bool {
        self.status == SlotStatus::Booked && self.booked_by == Some(patient_id)
    }

    pub fn holder_is_consistent(&self) -> bool {
        self.booked_by.is_some() == (self.status == SlotStatus::Booked)
    }
}

/// Conjunction of optional predicates over a doctor's slots.
#[derive(Debug, Clone, Default)]
pub struct SlotFilter {
    pub status: Option<SlotStatus>,
    pub booked_by: Option<Uuid>,
    /// Exclusive lower bound on `start_time`.
    pub starts_after: Option<DateTime<Utc>>,
    /// Inclusive lower bound on `start_time`.
    pub starts_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `start_time`.
    pub starts_before: Option<DateTime<Utc>>,
}

impl SlotFilter {
    pub fn available_after(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(SlotStatus::Available),
            starts_after: Some(now),
            ..Self::default()
        }
    }

    pub fn booked_by_after(patient_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(SlotStatus::Booked),
            booked_by: Some(patient_id),
            starts_after: Some(now),
            ..Self::default()
        }
    }

    pub fn on_day(date: NaiveDate) -> Self {
        let start = date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        let end = date.succ_opt()
            .and_then(|next| next.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());
        Self {
            starts_from: start,
            starts_before: end,
            ..Self::default()
        }
    }

    pub fn matches(&self, slot: &Slot) -> bool {
        self.status.map_or(true, |s| slot.status == s)
            && self.booked_by.map_or(true, |p| slot.booked_by == Some(p))
            && self.starts_after.map_or(true, |t| slot.start_time > t)
            && self.starts_from.map_or(true, |t| slot.start_time >= t)
            && self.starts_before.map_or(true, |t| slot.start_time < t)
    }
}

// ==============================================================================
// API MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SlotStatus,
    pub booked_by: Option<Uuid>,
}

impl From<Slot> for SlotView {
    fn from(slot: Slot) -> Self {
        Self {
            id: slot.id,
            doctor_id: slot.doctor_id,
            start_time: slot.start_time,
            end_time: slot.end_time,
            status: slot.status,
            booked_by: slot.booked_by,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleGroup {
    pub id: String,
    pub date: NaiveDate,
    pub available_slots: usize,
    pub time_slots: Vec<SlotView>,
    pub has_user_booking_in_group: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleGroupsPage {
    pub schedule_groups: Vec<ScheduleGroup>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSlotRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityUpdateRequest {
    #[serde(default)]
    pub added_slots: Vec<NewSlotRequest>,
    #[serde(default)]
    pub removed_slots: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailableDoctor {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    /// Earliest available slot, `YYYY-MM-DD HH:MM` in UTC.
    pub datetime: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableDoctorsPage {
    pub available_doctors: Vec<AvailableDoctor>,
    pub pagination: Pagination,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AvailabilityError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Availability slot not found: {0}")]
    SlotNotFound(Uuid),

    #[error("Cannot remove booked slots: {0:?}")]
    SlotsBooked(Vec<Uuid>),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<StoreError> for AvailabilityError {
    fn from(err: StoreError) -> Self {
        AvailabilityError::StorageUnavailable(err.to_string())
    }
}
