//! Prescription persistence trait
//!
//! Defines the interface for prescription storage operations.

use async_trait::async_trait;
use testfachdienst_api::Erezept;

/// Prescription persistence operations
#[async_trait]
pub trait ErezeptPersistence: Send + Sync {
    /// Find all prescriptions ordered by id
    async fn erezept_find_all(&self) -> anyhow::Result<Vec<Erezept>>;

    /// Get a prescription by its id
    async fn erezept_find_by_id(&self, id: i64) -> anyhow::Result<Option<Erezept>>;

    /// Get a prescription by its prescription identifier
    async fn erezept_find_by_prescription_id(
        &self,
        prescription_id: &str,
    ) -> anyhow::Result<Option<Erezept>>;

    /// Check if a prescription with the id exists
    async fn erezept_exists_by_id(&self, id: i64) -> anyhow::Result<bool>;

    /// Check if a prescription identifier is taken
    async fn erezept_exists_by_prescription_id(
        &self,
        prescription_id: &str,
    ) -> anyhow::Result<bool>;

    /// Insert a new prescription, ignoring any id on the input
    async fn erezept_insert(&self, erezept: Erezept) -> anyhow::Result<Erezept>;

    /// Overwrite the stored prescription with the same id
    ///
    /// Returns `None` when no row has that id.
    async fn erezept_update(&self, erezept: Erezept) -> anyhow::Result<Option<Erezept>>;

    /// Delete a prescription, returning whether a row was removed
    async fn erezept_delete(&self, id: i64) -> anyhow::Result<bool>;

    /// Check storage connectivity
    async fn health_check(&self) -> anyhow::Result<()>;
}
