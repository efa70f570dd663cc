pub mod slot_store;
pub mod memory;
pub mod schedule;
pub mod management;

pub use slot_store::{SlotStore, SupabaseSlotStore};
pub use memory::InMemorySlotStore;
pub use schedule::ScheduleAggregator;
pub use management::AvailabilityService;
