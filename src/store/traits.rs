//! Backend-agnostic `Database` trait for key/value JSON settings.
//!
//! Each record is addressed by an owner (a partner id) and a key. Values are
//! whole JSON documents; there is no partial update.

use async_trait::async_trait;

use crate::error::DatabaseError;

#[async_trait]
pub trait Database: Send + Sync {
    /// Create tables and run pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Read a setting, or `None` when absent.
    async fn get_setting(
        &self,
        owner: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError>;

    /// Insert or replace a setting.
    async fn set_setting(
        &self,
        owner: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError>;

    /// Delete a setting. Returns whether a record existed.
    async fn delete_setting(&self, owner: &str, key: &str) -> Result<bool, DatabaseError>;
}
