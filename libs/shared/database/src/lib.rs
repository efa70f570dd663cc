pub mod error;
pub mod profiles;
pub mod supabase;

pub use error::StoreError;
