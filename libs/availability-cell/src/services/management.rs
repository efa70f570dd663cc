// libs/availability-cell/src/services/management.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_database::profiles::{Profile, ProfileLookup};
use shared_database::StoreError;
use shared_models::pagination::{PageRequest, Pagination};

use crate::models::{
    AvailabilityError, AvailabilityUpdateRequest, AvailableDoctor, AvailableDoctorsPage,
    Slot, SlotFilter,
};
use crate::services::slot_store::SlotStore;

const DEFAULT_CATEGORY: &str = "General Medicine";
const DEFAULT_SCORE: f64 = 4.5;
const UNKNOWN_DOCTOR: &str = "Unknown Doctor";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Doctor-facing slot publishing plus the public "who has time" listing.
pub struct AvailabilityService {
    slots: Arc<dyn SlotStore>,
    profiles: Arc<dyn ProfileLookup>,
}

impl AvailabilityService {
    pub fn new(slots: Arc<dyn SlotStore>, profiles: Arc<dyn ProfileLookup>) -> Self {
        Self { slots, profiles }
    }

    /// Add and remove slots of one doctor, returning the doctor's full slot
    /// list afterwards. The whole request is validated before anything is
    /// written.
    #[instrument(skip(self, request), fields(added = request.added_slots.len(), removed = request.removed_slots.len()))]
    pub async fn update_availability(
        &self,
        doctor_id: Uuid,
        request: AvailabilityUpdateRequest,
    ) -> Result<Vec<Slot>, AvailabilityError> {
        if request.added_slots.is_empty() && request.removed_slots.is_empty() {
            return Err(AvailabilityError::ValidationError(
                "At least one slot must be added or removed".to_string(),
            ));
        }

        for added in &request.added_slots {
            if added.start_time >= added.end_time {
                return Err(AvailabilityError::ValidationError(
                    "Slot start time must be before its end time".to_string(),
                ));
            }
        }

        let mut booked = Vec::new();
        let mut removable = Vec::with_capacity(request.removed_slots.len());
        for slot_id in &request.removed_slots {
            let slot = match self.slots.get(*slot_id).await {
                Ok(slot) => slot,
                Err(StoreError::NotFound) => return Err(AvailabilityError::SlotNotFound(*slot_id)),
                Err(e) => return Err(e.into()),
            };
            if slot.doctor_id != doctor_id {
                return Err(AvailabilityError::SlotNotFound(*slot_id));
            }
            if slot.is_available() {
                removable.push(slot);
            } else {
                booked.push(*slot_id);
            }
        }
        if !booked.is_empty() {
            warn!("Doctor {} tried to remove {} booked slots", doctor_id, booked.len());
            return Err(AvailabilityError::SlotsBooked(booked));
        }

        // Removals before insertions; a failure at either step rolls both back.
        let mut removed: Vec<Slot> = Vec::with_capacity(removable.len());
        for slot in removable {
            let refused = match self.slots.delete_available(slot.id, doctor_id).await {
                Ok(()) => {
                    info!("Doctor {} removed slot {}", doctor_id, slot.id);
                    removed.push(slot);
                    continue;
                }
                // Booked between the check above and the conditional delete.
                Err(StoreError::Conflict) => AvailabilityError::SlotsBooked(vec![slot.id]),
                Err(StoreError::NotFound) => AvailabilityError::SlotNotFound(slot.id),
                Err(e) => e.into(),
            };
            self.roll_back(doctor_id, &removed, &[]).await;
            return Err(refused);
        }

        let mut inserted: Vec<Slot> = Vec::with_capacity(request.added_slots.len());
        for added in request.added_slots {
            let slot = Slot::new_available(doctor_id, added.start_time, added.end_time);
            match self.slots.insert(slot).await {
                Ok(created) => {
                    info!("Doctor {} published slot {}", doctor_id, created.id);
                    inserted.push(created);
                }
                Err(e) => {
                    self.roll_back(doctor_id, &removed, &inserted).await;
                    return Err(e.into());
                }
            }
        }

        Ok(self.slots.list_by_doctor(doctor_id, SlotFilter::default()).await?)
    }

    /// Best-effort undo of a partially applied update: removed slots are put
    /// back, published ones are withdrawn again unless already booked.
    async fn roll_back(&self, doctor_id: Uuid, removed: &[Slot], inserted: &[Slot]) {
        for slot in removed {
            match self.slots.insert(slot.clone()).await {
                Ok(_) => debug!("Restored slot {}", slot.id),
                Err(e) => warn!("Failed to restore slot {}: {}", slot.id, e),
            }
        }
        for slot in inserted {
            match self.slots.delete_available(slot.id, doctor_id).await {
                Ok(()) => debug!("Withdrew slot {}", slot.id),
                Err(e) => warn!("Failed to withdraw slot {}: {}", slot.id, e),
            }
        }
    }

    /// Every slot of the doctor, or only those starting on `date` (UTC).
    pub async fn my_slots(
        &self,
        doctor_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Slot>, AvailabilityError> {
        let filter = date.map(SlotFilter::on_day).unwrap_or_default();
        Ok(self.slots.list_by_doctor(doctor_id, filter).await?)
    }

    /// Doctors with at least one future available slot, best score first.
    #[instrument(skip(self))]
    pub async fn available_doctors(
        &self,
        page: PageRequest,
        now: DateTime<Utc>,
    ) -> Result<AvailableDoctorsPage, AvailabilityError> {
        let open_slots = self.slots.list_available(now).await?;

        // Slots come back ordered by start time, so the first one seen per
        // doctor is that doctor's earliest.
        let mut earliest: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        let mut doctor_ids = Vec::new();
        for slot in &open_slots {
            if !earliest.contains_key(&slot.doctor_id) {
                earliest.insert(slot.doctor_id, slot.start_time);
                doctor_ids.push(slot.doctor_id);
            }
        }
        debug!("{} doctors have open slots", doctor_ids.len());

        let profiles: HashMap<Uuid, Profile> = match self.profiles.find_profiles(&doctor_ids).await {
            Ok(found) => found.into_iter().map(|p| (p.id, p)).collect(),
            Err(e) => {
                warn!("Profile lookup failed, using placeholders: {}", e);
                HashMap::new()
            }
        };

        let mut doctors: Vec<(AvailableDoctor, Option<f64>)> = doctor_ids
            .into_iter()
            .filter(|id| {
                profiles.get(id)
                    .and_then(|p| p.role.as_deref())
                    .map_or(true, |role| role == "doctor")
            })
            .filter_map(|id| {
                let first = earliest.get(&id)?;
                let profile = profiles.get(&id);
                let score = profile.and_then(|p| p.score);
                Some((to_available_doctor(id, profile, *first), score))
            })
            .collect();

        doctors.sort_by(|(_, a), (_, b)| match (a, b) {
            (Some(a), Some(b)) => b.total_cmp(a),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        let doctors: Vec<AvailableDoctor> = doctors.into_iter().map(|(d, _)| d).collect();
        let pagination = Pagination::new(page, doctors.len());

        Ok(AvailableDoctorsPage {
            available_doctors: page.slice(&doctors),
            pagination,
        })
    }
}

fn to_available_doctor(id: Uuid, profile: Option<&Profile>, earliest: DateTime<Utc>) -> AvailableDoctor {
    AvailableDoctor {
        id,
        name: profile
            .and_then(|p| p.full_name.clone())
            .unwrap_or_else(|| UNKNOWN_DOCTOR.to_string()),
        category: profile
            .and_then(|p| p.specialty.clone())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        datetime: earliest.format(DATETIME_FORMAT).to_string(),
        score: profile.and_then(|p| p.score).unwrap_or(DEFAULT_SCORE),
    }
}
