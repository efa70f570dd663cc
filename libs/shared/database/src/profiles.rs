use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::supabase::SupabaseClient;

/// Display data for a user. Every field but the id may be missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub specialty: Option<String>,
    pub score: Option<f64>,
}

/// Read-only profile directory used to enrich responses.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn find_profiles(&self, ids: &[Uuid]) -> Result<Vec<Profile>, StoreError>;
}

const PROFILE_COLUMNS: &str = "id,full_name,email,role,specialty,score";

pub struct SupabaseProfileLookup {
    supabase: Arc<SupabaseClient>,
    service_key: String,
}

impl SupabaseProfileLookup {
    pub fn new(supabase: Arc<SupabaseClient>, service_key: &str) -> Self {
        Self {
            supabase,
            service_key: service_key.to_string(),
        }
    }
}

#[async_trait]
impl ProfileLookup for SupabaseProfileLookup {
    async fn find_profiles(&self, ids: &[Uuid]) -> Result<Vec<Profile>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let id_list = ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",");
        let path = format!("/rest/v1/profiles?id=in.({})&select={}", id_list, PROFILE_COLUMNS);
        debug!("Fetching {} profiles", ids.len());

        let rows: Vec<Profile> = self.supabase
            .request(Method::GET, &path, Some(&self.service_key), None)
            .await?;
        Ok(rows)
    }
}

#[derive(Default)]
pub struct InMemoryProfiles {
    profiles: RwLock<HashMap<Uuid, Profile>>,
}

impl InMemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, profile: Profile) {
        self.profiles.write().await.insert(profile.id, profile);
    }
}

#[async_trait]
impl ProfileLookup for InMemoryProfiles {
    async fn find_profiles(&self, ids: &[Uuid]) -> Result<Vec<Profile>, StoreError> {
        let profiles = self.profiles.read().await;
        Ok(ids.iter().filter_map(|id| profiles.get(id).cloned()).collect())
    }
}
