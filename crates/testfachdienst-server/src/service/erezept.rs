//! Prescription business service
//!
//! Shared by the REST controller and the STOMP controller.

use std::sync::Arc;

use testfachdienst_api::Erezept;
use testfachdienst_common::TestfachdienstError;
use testfachdienst_persistence::ErezeptPersistence;

/// Prescription operations on top of the persistence layer
#[derive(Clone)]
pub struct ErezeptService {
    persistence: Arc<dyn ErezeptPersistence>,
}

impl ErezeptService {
    pub fn new(persistence: Arc<dyn ErezeptPersistence>) -> Self {
        Self { persistence }
    }

    pub async fn find_all(&self) -> anyhow::Result<Vec<Erezept>> {
        self.persistence.erezept_find_all().await
    }

    pub async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<Erezept>> {
        self.persistence.erezept_find_by_id(id).await
    }

    pub async fn find_by_prescription_id(
        &self,
        prescription_id: &str,
    ) -> anyhow::Result<Option<Erezept>> {
        self.persistence
            .erezept_find_by_prescription_id(prescription_id)
            .await
    }

    /// Store a prescription when its prescription identifier is still free
    ///
    /// Returns `None` for a duplicate. Any id on the request is ignored.
    pub async fn create(&self, prescription: Erezept) -> anyhow::Result<Option<Erezept>> {
        if self
            .exists_by_prescription_id(Some(&prescription.prescription_id))
            .await?
        {
            return Ok(None);
        }

        match self.persistence.erezept_insert(prescription).await {
            Ok(saved) => Ok(Some(saved)),
            // lost a race against a concurrent insert of the same identifier
            Err(e) if matches!(
                e.downcast_ref::<TestfachdienstError>(),
                Some(TestfachdienstError::Conflict(_))
            ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Apply medication name, dosage, expiry and status to an existing prescription
    ///
    /// An unset status keeps the stored one. Returns `None` if the id is unknown.
    pub async fn update(&self, id: i64, update_data: Erezept) -> anyhow::Result<Option<Erezept>> {
        let Some(mut existing) = self.persistence.erezept_find_by_id(id).await? else {
            return Ok(None);
        };

        existing.medication_name = update_data.medication_name;
        existing.dosage = update_data.dosage;
        existing.expires_at = update_data.expires_at;
        if update_data.status.is_some() {
            existing.status = update_data.status;
        }

        self.persistence.erezept_update(existing).await
    }

    /// Delete a prescription if it exists, returning whether it did
    pub async fn delete_if_exists(&self, id: i64) -> anyhow::Result<bool> {
        if !self.persistence.erezept_exists_by_id(id).await? {
            return Ok(false);
        }
        self.persistence.erezept_delete(id).await
    }

    /// Insert when `id` is unset, otherwise overwrite the stored record
    pub async fn save(&self, prescription: Erezept) -> anyhow::Result<Erezept> {
        match prescription.id {
            None => self.persistence.erezept_insert(prescription).await,
            Some(id) => self
                .persistence
                .erezept_update(prescription)
                .await?
                .ok_or_else(|| {
                    TestfachdienstError::NotFound(format!("ERezept with id={} not found", id))
                        .into()
                }),
        }
    }

    pub async fn delete_by_id(&self, id: i64) -> anyhow::Result<()> {
        self.persistence.erezept_delete(id).await?;
        Ok(())
    }

    pub async fn exists_by_id(&self, id: i64) -> anyhow::Result<bool> {
        self.persistence.erezept_exists_by_id(id).await
    }

    /// Check whether a prescription identifier is taken; a missing or blank one never is
    pub async fn exists_by_prescription_id(
        &self,
        prescription_id: Option<&str>,
    ) -> anyhow::Result<bool> {
        match prescription_id {
            Some(pid) if !pid.trim().is_empty() => {
                self.persistence.erezept_exists_by_prescription_id(pid).await
            }
            _ => Ok(false),
        }
    }

    pub async fn health_check(&self) -> anyhow::Result<()> {
        self.persistence.health_check().await
    }
}
