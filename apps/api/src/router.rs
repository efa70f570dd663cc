use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::handlers::AppointmentState;
use appointment_cell::router::appointment_routes;
use appointment_cell::services::{AppointmentStore, InMemoryAppointmentStore, SupabaseAppointmentStore};
use availability_cell::handlers::AvailabilityState;
use availability_cell::router::availability_routes;
use availability_cell::services::{InMemorySlotStore, SlotStore, SupabaseSlotStore};
use shared_config::{AppConfig, StorageBackend};
use shared_database::profiles::{InMemoryProfiles, ProfileLookup, SupabaseProfileLookup};
use shared_database::supabase::SupabaseClient;

/// Store instances shared by every cell.
#[derive(Clone)]
pub struct Stores {
    pub slots: Arc<dyn SlotStore>,
    pub appointments: Arc<dyn AppointmentStore>,
    pub profiles: Arc<dyn ProfileLookup>,
}

impl Stores {
    pub fn from_config(config: &AppConfig) -> Self {
        match config.storage_backend {
            StorageBackend::Supabase => {
                let supabase = Arc::new(SupabaseClient::new(config));
                let key = &config.supabase_service_role_key;
                Self {
                    slots: Arc::new(SupabaseSlotStore::new(supabase.clone(), key)),
                    appointments: Arc::new(SupabaseAppointmentStore::new(supabase.clone(), key)),
                    profiles: Arc::new(SupabaseProfileLookup::new(supabase, key)),
                }
            }
            StorageBackend::Memory => Self::in_memory(),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            slots: Arc::new(InMemorySlotStore::new()),
            appointments: Arc::new(InMemoryAppointmentStore::new()),
            profiles: Arc::new(InMemoryProfiles::new()),
        }
    }
}

pub fn create_router(config: Arc<AppConfig>, stores: Stores) -> Router {
    let availability = AvailabilityState {
        config: config.clone(),
        slots: stores.slots.clone(),
        profiles: stores.profiles.clone(),
    };

    let appointments = AppointmentState {
        config,
        slots: stores.slots,
        appointments: stores.appointments,
        profiles: stores.profiles,
    };

    Router::new()
        .route("/", get(|| async { "Clinic Booking API is running!" }))
        .nest("/appointments", appointment_routes(appointments))
        .nest("/availability", availability_routes(availability))
}
