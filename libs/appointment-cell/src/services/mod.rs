pub mod appointment_store;
pub mod memory;
pub mod coordinator;
pub mod directory;

pub use appointment_store::{AppointmentStore, SupabaseAppointmentStore};
pub use memory::InMemoryAppointmentStore;
pub use coordinator::BookingCoordinator;
pub use directory::AppointmentDirectory;
