// libs/availability-cell/src/services/schedule.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use shared_models::pagination::{PageRequest, Pagination};

use crate::models::{AvailabilityError, ScheduleGroup, ScheduleGroupsPage, Slot, SlotFilter, SlotView};
use crate::services::slot_store::SlotStore;

/// Read-only, day-grouped view of a doctor's bookable time.
pub struct ScheduleAggregator {
    slots: Arc<dyn SlotStore>,
}

impl ScheduleAggregator {
    pub fn new(slots: Arc<dyn SlotStore>) -> Self {
        Self { slots }
    }

    /// Future available slots of the doctor, plus the requesting patient's own
    /// future bookings with that doctor, grouped by UTC day and paginated over
    /// the groups.
    #[instrument(skip(self))]
    pub async fn schedule_groups(
        &self,
        doctor_id: Uuid,
        patient_id: Option<Uuid>,
        page: PageRequest,
        now: DateTime<Utc>,
    ) -> Result<ScheduleGroupsPage, AvailabilityError> {
        let mut slots = self.slots
            .list_by_doctor(doctor_id, SlotFilter::available_after(now))
            .await?;

        if let Some(patient_id) = patient_id {
            let booked = self.slots
                .list_by_doctor(doctor_id, SlotFilter::booked_by_after(patient_id, now))
                .await?;
            debug!("Patient {} holds {} upcoming slots with doctor {}", patient_id, booked.len(), doctor_id);
            slots.extend(booked);
        }

        let groups = group_by_day(slots, patient_id);
        let pagination = Pagination::new(page, groups.len());

        Ok(ScheduleGroupsPage {
            schedule_groups: page.slice(&groups),
            pagination,
        })
    }
}

/// Group slots by the UTC date of their start time. Groups and the slots in
/// each group come out in chronological order; ids are numbered over the
/// whole result so they stay stable across pages.
pub fn group_by_day(mut slots: Vec<Slot>, patient_id: Option<Uuid>) -> Vec<ScheduleGroup> {
    slots.sort_by_key(|s| (s.start_time, s.id));

    let mut by_day: BTreeMap<NaiveDate, Vec<Slot>> = BTreeMap::new();
    for slot in slots {
        by_day.entry(slot.start_time.date_naive()).or_default().push(slot);
    }

    by_day
        .into_iter()
        .enumerate()
        .map(|(index, (date, day_slots))| {
            let has_user_booking_in_group = patient_id
                .map_or(false, |p| day_slots.iter().any(|s| s.is_held_by(p)));

            ScheduleGroup {
                id: format!("day_{:03}", index + 1),
                date,
                available_slots: day_slots.len(),
                time_slots: day_slots.into_iter().map(SlotView::from).collect(),
                has_user_booking_in_group,
            }
        })
        .collect()
}
