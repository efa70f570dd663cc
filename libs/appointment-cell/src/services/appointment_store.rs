// libs/appointment-cell/src/services/appointment_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::supabase::{return_representation, SupabaseClient};
use shared_database::StoreError;
use shared_models::pagination::{Page, PageRequest};

use crate::models::Appointment;

/// Owner of appointment records.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// The pending or confirmed appointment between the pair, if any.
    async fn find_active(&self, patient_id: Uuid, doctor_id: Uuid) -> Result<Option<Appointment>, StoreError>;

    /// Lookup scoped to the owning patient. Another patient's appointment is
    /// `NotFound`, exactly like a missing one.
    async fn find_by_id_for_patient(&self, appointment_id: Uuid, patient_id: Uuid) -> Result<Appointment, StoreError>;

    /// The active appointment referencing a slot.
    async fn find_by_slot(&self, slot_id: Uuid) -> Result<Option<Appointment>, StoreError>;

    /// Insert or replace by id.
    async fn save(&self, appointment: Appointment) -> Result<Appointment, StoreError>;

    /// Replace the stored record only while it is still active and on
    /// `expected_slot`. `Conflict` when either no longer holds.
    async fn update_if_active(&self, appointment: Appointment, expected_slot: Uuid) -> Result<Appointment, StoreError>;

    async fn list_by_patient(&self, patient_id: Uuid, page: PageRequest) -> Result<Page<Appointment>, StoreError>;

    async fn list_by_doctor(&self, doctor_id: Uuid, page: PageRequest) -> Result<Page<Appointment>, StoreError>;
}

const APPOINTMENTS_PATH: &str = "/rest/v1/appointments";
const ACTIVE_FILTER: &str = "status=in.(pending,confirmed)";

pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
    service_key: String,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>, service_key: &str) -> Self {
        Self {
            supabase,
            service_key: service_key.to_string(),
        }
    }

    async fn first(&self, query: &str) -> Result<Option<Appointment>, StoreError> {
        let path = format!("{}?{}&limit=1", APPOINTMENTS_PATH, query);
        let rows: Vec<Appointment> = self.supabase
            .request(Method::GET, &path, Some(&self.service_key), None)
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn page(&self, owner_filter: String, page: PageRequest) -> Result<Page<Appointment>, StoreError> {
        let path = format!(
            "{}?{}&order=created_at.desc&limit={}&offset={}",
            APPOINTMENTS_PATH,
            owner_filter,
            page.limit(),
            page.offset()
        );
        let (items, total): (Vec<Appointment>, usize) = self.supabase
            .request_with_count(&path, Some(&self.service_key))
            .await?;
        debug!("Fetched {} of {} appointments", items.len(), total);
        Ok(Page { items, total })
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn find_active(&self, patient_id: Uuid, doctor_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        self.first(&format!(
            "patient_id=eq.{}&doctor_id=eq.{}&{}",
            patient_id, doctor_id, ACTIVE_FILTER
        )).await
    }

    async fn find_by_id_for_patient(&self, appointment_id: Uuid, patient_id: Uuid) -> Result<Appointment, StoreError> {
        self.first(&format!("id=eq.{}&patient_id=eq.{}", appointment_id, patient_id))
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn find_by_slot(&self, slot_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        self.first(&format!("slot_id=eq.{}&{}", slot_id, ACTIVE_FILTER)).await
    }

    async fn save(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let body = serde_json::to_value(&appointment)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=representation"),
        );

        let rows: Vec<Appointment> = self.supabase
            .request_with_headers(
                Method::POST,
                APPOINTMENTS_PATH,
                Some(&self.service_key),
                Some(body),
                Some(headers),
            )
            .await?;

        let saved = rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Unavailable("Upsert returned no representation".to_string()))?;
        info!("Appointment {} saved with status {}", saved.id, saved.status);
        Ok(saved)
    }

    async fn update_if_active(&self, appointment: Appointment, expected_slot: Uuid) -> Result<Appointment, StoreError> {
        let path = format!(
            "{}?id=eq.{}&slot_id=eq.{}&{}",
            APPOINTMENTS_PATH, appointment.id, expected_slot, ACTIVE_FILTER
        );
        let body = serde_json::to_value(&appointment)?;

        let rows: Vec<Appointment> = self.supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(&self.service_key),
                Some(body),
                Some(return_representation()),
            )
            .await?;

        match rows.into_iter().next() {
            Some(updated) => {
                info!("Appointment {} updated to status {}", updated.id, updated.status);
                Ok(updated)
            }
            None => {
                debug!("Appointment {} changed since it was read", appointment.id);
                Err(StoreError::Conflict)
            }
        }
    }

    async fn list_by_patient(&self, patient_id: Uuid, page: PageRequest) -> Result<Page<Appointment>, StoreError> {
        self.page(format!("patient_id=eq.{}", patient_id), page).await
    }

    async fn list_by_doctor(&self, doctor_id: Uuid, page: PageRequest) -> Result<Page<Appointment>, StoreError> {
        self.page(format!("doctor_id=eq.{}", doctor_id), page).await
    }
}
