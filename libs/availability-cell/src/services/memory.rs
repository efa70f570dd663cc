// libs/availability-cell/src/services/memory.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::StoreError;

use crate::models::{Slot, SlotFilter, SlotStatus};
use crate::services::slot_store::SlotStore;

/// Process-local slot store. Each transition checks and writes under a single
/// write guard, which gives the same compare-and-swap semantics as the
/// conditional PATCH of the PostgREST store.
#[derive(Default)]
pub struct InMemorySlotStore {
    slots: RwLock<HashMap<Uuid, Slot>>,
}

impl InMemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every slot, ordered by start time.
    pub async fn all_slots(&self) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self.slots.read().await.values().cloned().collect();
        slots.sort_by_key(|s| s.start_time);
        slots
    }
}

#[async_trait]
impl SlotStore for InMemorySlotStore {
    async fn get(&self, slot_id: Uuid) -> Result<Slot, StoreError> {
        self.slots.read().await
            .get(&slot_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn try_reserve(&self, slot_id: Uuid, patient_id: Uuid) -> Result<Slot, StoreError> {
        let mut slots = self.slots.write().await;
        let slot = slots.get_mut(&slot_id).ok_or(StoreError::NotFound)?;

        if slot.status != SlotStatus::Available {
            debug!("Slot {} was not available for patient {}", slot_id, patient_id);
            return Err(StoreError::Conflict);
        }

        slot.status = SlotStatus::Booked;
        slot.booked_by = Some(patient_id);
        info!("Slot {} reserved for patient {}", slot_id, patient_id);
        Ok(slot.clone())
    }

    async fn release(&self, slot_id: Uuid) -> Result<Slot, StoreError> {
        let mut slots = self.slots.write().await;
        let slot = slots.get_mut(&slot_id).ok_or(StoreError::NotFound)?;

        if slot.status == SlotStatus::Booked {
            slot.status = SlotStatus::Available;
            slot.booked_by = None;
            info!("Slot {} released", slot_id);
        }
        Ok(slot.clone())
    }

    async fn release_held_by(&self, slot_id: Uuid, patient_id: Uuid) -> Result<Slot, StoreError> {
        let mut slots = self.slots.write().await;
        let slot = slots.get_mut(&slot_id).ok_or(StoreError::NotFound)?;

        if !slot.is_held_by(patient_id) {
            debug!("Slot {} is not held by patient {}", slot_id, patient_id);
            return Err(StoreError::Conflict);
        }

        slot.status = SlotStatus::Available;
        slot.booked_by = None;
        info!("Slot {} released by patient {}", slot_id, patient_id);
        Ok(slot.clone())
    }

    async fn list_by_doctor(&self, doctor_id: Uuid, filter: SlotFilter) -> Result<Vec<Slot>, StoreError> {
        let mut matching: Vec<Slot> = self.slots.read().await
            .values()
            .filter(|s| s.doctor_id == doctor_id && filter.matches(s))
            .cloned()
            .collect();
        matching.sort_by_key(|s| s.start_time);
        Ok(matching)
    }

    async fn list_available(&self, after: DateTime<Utc>) -> Result<Vec<Slot>, StoreError> {
        let filter = SlotFilter::available_after(after);
        let mut matching: Vec<Slot> = self.slots.read().await
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        matching.sort_by_key(|s| s.start_time);
        Ok(matching)
    }

    async fn insert(&self, slot: Slot) -> Result<Slot, StoreError> {
        self.slots.write().await.insert(slot.id, slot.clone());
        Ok(slot)
    }

    async fn delete_available(&self, slot_id: Uuid, doctor_id: Uuid) -> Result<(), StoreError> {
        let mut slots = self.slots.write().await;
        match slots.get(&slot_id) {
            Some(slot) if slot.doctor_id != doctor_id => Err(StoreError::NotFound),
            Some(slot) if slot.status != SlotStatus::Available => Err(StoreError::Conflict),
            Some(_) => {
                slots.remove(&slot_id);
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }
}
