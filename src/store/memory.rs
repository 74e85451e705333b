//! In-memory `Database`: for tests and ephemeral deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::DatabaseError;
use crate::store::traits::Database;

#[derive(Default)]
pub struct MemoryDatabase {
    settings: RwLock<HashMap<(String, String), serde_json::Value>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.settings.read().await.len()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn get_setting(
        &self,
        owner: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError> {
        let settings = self.settings.read().await;
        Ok(settings.get(&(owner.to_string(), key.to_string())).cloned())
    }

    async fn set_setting(
        &self,
        owner: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let mut settings = self.settings.write().await;
        settings.insert((owner.to_string(), key.to_string()), value.clone());
        Ok(())
    }

    async fn delete_setting(&self, owner: &str, key: &str) -> Result<bool, DatabaseError> {
        let mut settings = self.settings.write().await;
        Ok(settings.remove(&(owner.to_string(), key.to_string())).is_some())
    }
}
