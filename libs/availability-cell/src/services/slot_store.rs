// libs/availability-cell/src/services/slot_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::StoreError;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{Slot, SlotFilter};

/// Owner of slot records. Status transitions are compare-and-swap operations:
/// an implementation must check the precondition and apply the write as one
/// atomic step, never as a read followed by a write.
#[async_trait]
pub trait SlotStore: Send + Sync {
    async fn get(&self, slot_id: Uuid) -> Result<Slot, StoreError>;

    /// AVAILABLE -> BOOKED for `patient_id`. `Conflict` when the slot is not
    /// available at the instant of the update, whoever holds it.
    async fn try_reserve(&self, slot_id: Uuid, patient_id: Uuid) -> Result<Slot, StoreError>;

    /// BOOKED -> AVAILABLE regardless of holder. An available slot is
    /// returned unchanged.
    async fn release(&self, slot_id: Uuid) -> Result<Slot, StoreError>;

    /// BOOKED by `patient_id` -> AVAILABLE. `Conflict` when the slot is
    /// available or held by anyone else at the instant of the update.
    async fn release_held_by(&self, slot_id: Uuid, patient_id: Uuid) -> Result<Slot, StoreError>;

    /// Slots of a doctor ordered by start time.
    async fn list_by_doctor(&self, doctor_id: Uuid, filter: SlotFilter) -> Result<Vec<Slot>, StoreError>;

    /// Available slots of every doctor starting after `after`, by start time.
    async fn list_available(&self, after: DateTime<Utc>) -> Result<Vec<Slot>, StoreError>;

    async fn insert(&self, slot: Slot) -> Result<Slot, StoreError>;

    /// Delete only if owned by `doctor_id` and still available. A slot owned
    /// by someone else is reported as `NotFound`.
    async fn delete_available(&self, slot_id: Uuid, doctor_id: Uuid) -> Result<(), StoreError>;
}

const SLOTS_PATH: &str = "/rest/v1/availability_slots";

pub struct SupabaseSlotStore {
    supabase: Arc<SupabaseClient>,
    service_key: String,
}

impl SupabaseSlotStore {
    pub fn new(supabase: Arc<SupabaseClient>, service_key: &str) -> Self {
        Self {
            supabase,
            service_key: service_key.to_string(),
        }
    }

    async fn fetch(&self, path: &str) -> Result<Vec<Slot>, StoreError> {
        let rows: Vec<Slot> = self.supabase
            .request(Method::GET, path, Some(&self.service_key), None)
            .await?;
        Ok(rows)
    }

    /// Conditional PATCH. PostgREST evaluates the filter and the update in a
    /// single statement, so an empty representation means the precondition
    /// did not hold.
    async fn patch_where(&self, filter: &str, body: serde_json::Value) -> Result<Option<Slot>, StoreError> {
        let path = format!("{}?{}", SLOTS_PATH, filter);
        let rows: Vec<Slot> = self.supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(&self.service_key),
                Some(body),
                Some(return_representation()),
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

fn encode_time(time: &DateTime<Utc>) -> String {
    urlencoding::encode(&time.to_rfc3339()).into_owned()
}

fn filter_query(filter: &SlotFilter) -> Vec<String> {
    let mut query_parts = Vec::new();

    if let Some(status) = filter.status {
        query_parts.push(format!("status=eq.{}", status));
    }
    if let Some(patient_id) = filter.booked_by {
        query_parts.push(format!("booked_by=eq.{}", patient_id));
    }
    if let Some(after) = &filter.starts_after {
        query_parts.push(format!("start_time=gt.{}", encode_time(after)));
    }
    if let Some(from) = &filter.starts_from {
        query_parts.push(format!("start_time=gte.{}", encode_time(from)));
    }
    if let Some(before) = &filter.starts_before {
        query_parts.push(format!("start_time=lt.{}", encode_time(before)));
    }

    query_parts
}

#[async_trait]
impl SlotStore for SupabaseSlotStore {
    async fn get(&self, slot_id: Uuid) -> Result<Slot, StoreError> {
        debug!("Fetching slot: {}", slot_id);
        let path = format!("{}?id=eq.{}", SLOTS_PATH, slot_id);
        self.fetch(&path).await?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound)
    }

    async fn try_reserve(&self, slot_id: Uuid, patient_id: Uuid) -> Result<Slot, StoreError> {
        let reserved = self.patch_where(
            &format!("id=eq.{}&status=eq.available", slot_id),
            json!({
                "status": "booked",
                "booked_by": patient_id,
            }),
        ).await?;

        match reserved {
            Some(slot) => {
                info!("Slot {} reserved for patient {}", slot_id, patient_id);
                Ok(slot)
            }
            None => {
                // Classification only: the write already failed atomically.
                self.get(slot_id).await?;
                debug!("Slot {} was not available for patient {}", slot_id, patient_id);
                Err(StoreError::Conflict)
            }
        }
    }

    async fn release(&self, slot_id: Uuid) -> Result<Slot, StoreError> {
        let released = self.patch_where(
            &format!("id=eq.{}&status=eq.booked", slot_id),
            json!({
                "status": "available",
                "booked_by": null,
            }),
        ).await?;

        match released {
            Some(slot) => {
                info!("Slot {} released", slot_id);
                Ok(slot)
            }
            None => self.get(slot_id).await,
        }
    }

    async fn release_held_by(&self, slot_id: Uuid, patient_id: Uuid) -> Result<Slot, StoreError> {
        let released = self.patch_where(
            &format!("id=eq.{}&status=eq.booked&booked_by=eq.{}", slot_id, patient_id),
            json!({
                "status": "available",
                "booked_by": null,
            }),
        ).await?;

        match released {
            Some(slot) => {
                info!("Slot {} released by patient {}", slot_id, patient_id);
                Ok(slot)
            }
            None => {
                self.get(slot_id).await?;
                debug!("Slot {} is not held by patient {}", slot_id, patient_id);
                Err(StoreError::Conflict)
            }
        }
    }

    async fn list_by_doctor(&self, doctor_id: Uuid, filter: SlotFilter) -> Result<Vec<Slot>, StoreError> {
        let mut query_parts = vec![format!("doctor_id=eq.{}", doctor_id)];
        query_parts.extend(filter_query(&filter));
        query_parts.push("order=start_time.asc".to_string());

        let path = format!("{}?{}", SLOTS_PATH, query_parts.join("&"));
        self.fetch(&path).await
    }

    async fn list_available(&self, after: DateTime<Utc>) -> Result<Vec<Slot>, StoreError> {
        let path = format!(
            "{}?status=eq.available&start_time=gt.{}&order=start_time.asc",
            SLOTS_PATH,
            encode_time(&after)
        );
        self.fetch(&path).await
    }

    async fn insert(&self, slot: Slot) -> Result<Slot, StoreError> {
        let body = serde_json::to_value(&slot)?;
        let rows: Vec<Slot> = self.supabase
            .request_with_headers(
                Method::POST,
                SLOTS_PATH,
                Some(&self.service_key),
                Some(body),
                Some(return_representation()),
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Unavailable("Insert returned no representation".to_string()))
    }

    async fn delete_available(&self, slot_id: Uuid, doctor_id: Uuid) -> Result<(), StoreError> {
        let path = format!(
            "{}?id=eq.{}&doctor_id=eq.{}&status=eq.available",
            SLOTS_PATH, slot_id, doctor_id
        );
        let deleted: Vec<Slot> = self.supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                Some(&self.service_key),
                None,
                Some(return_representation()),
            )
            .await?;

        if !deleted.is_empty() {
            info!("Slot {} deleted by doctor {}", slot_id, doctor_id);
            return Ok(());
        }

        let current = self.get(slot_id).await?;
        if current.doctor_id != doctor_id {
            return Err(StoreError::NotFound);
        }
        warn!("Refusing to delete booked slot {}", slot_id);
        Err(StoreError::Conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn filter_query_encodes_times() {
        let at = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap();
        let filter = SlotFilter {
            booked_by: Some(Uuid::nil()),
            ..SlotFilter::available_after(at)
        };
        let parts = filter_query(&filter);
        assert_eq!(parts[0], "status=eq.available");
        assert_eq!(parts[1], format!("booked_by=eq.{}", Uuid::nil()));
        assert_eq!(parts[2], "start_time=gt.2030-01-02T03%3A04%3A05%2B00%3A00");
    }
}
