//! SQL-based persistence backend (SQLite/PostgreSQL via SeaORM)
//!
//! Implements `ErezeptPersistence` with direct SeaORM queries.

use async_trait::async_trait;
use sea_orm::*;
use testfachdienst_api::{Erezept, ErezeptStatus};
use testfachdienst_common::TestfachdienstError;

use crate::entity::erezept;
use crate::traits::ErezeptPersistence;

/// Create the `erezept` table when it does not exist yet
pub async fn ensure_schema(db: &DatabaseConnection) -> anyhow::Result<()> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut stmt = schema.create_table_from_entity(erezept::Entity);
    stmt.if_not_exists();

    db.execute(backend.build(&stmt)).await?;
    tracing::info!(?backend, "Schema for table 'erezept' is ready");
    Ok(())
}

/// SQL persistence service
///
/// Wraps a SeaORM `DatabaseConnection`.
pub struct SqlPersistService {
    db: DatabaseConnection,
}

impl SqlPersistService {
    /// Create a new SqlPersistService with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Get a reference to the underlying database connection
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

fn to_erezept(model: erezept::Model) -> anyhow::Result<Erezept> {
    let status = model
        .status
        .parse::<ErezeptStatus>()
        .map_err(TestfachdienstError::DatabaseError)?;

    Ok(Erezept {
        id: Some(model.id),
        medication_name: model.medication_name,
        dosage: model.dosage,
        issued_at: Some(model.issued_at),
        expires_at: model.expires_at,
        status: Some(status),
        patient_id: model.patient_id,
        practitioner_id: model.practitioner_id,
        prescription_id: model.prescription_id,
    })
}

fn to_active_model(erezept: Erezept) -> anyhow::Result<erezept::ActiveModel> {
    let issued_at = erezept.issued_at.ok_or_else(|| {
        TestfachdienstError::DatabaseError("column 'issued_at' must not be null".to_string())
    })?;
    let status = erezept.status_or_default();

    Ok(erezept::ActiveModel {
        id: match erezept.id {
            Some(id) => Unchanged(id),
            None => NotSet,
        },
        medication_name: Set(erezept.medication_name),
        dosage: Set(erezept.dosage),
        issued_at: Set(issued_at),
        expires_at: Set(erezept.expires_at),
        status: Set(status.as_str().to_string()),
        patient_id: Set(erezept.patient_id),
        practitioner_id: Set(erezept.practitioner_id),
        prescription_id: Set(erezept.prescription_id),
    })
}

/// Translate unique-constraint violations into a conflict
fn map_write_error(err: DbErr, prescription_id: &str) -> anyhow::Error {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => TestfachdienstError::Conflict(format!(
            "ERezept with prescriptionId={} already exists",
            prescription_id
        ))
        .into(),
        _ => TestfachdienstError::DatabaseError(err.to_string()).into(),
    }
}

#[async_trait]
impl ErezeptPersistence for SqlPersistService {
    async fn erezept_find_all(&self) -> anyhow::Result<Vec<Erezept>> {
        erezept::Entity::find()
            .order_by_asc(erezept::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(to_erezept)
            .collect()
    }

    async fn erezept_find_by_id(&self, id: i64) -> anyhow::Result<Option<Erezept>> {
        erezept::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(to_erezept)
            .transpose()
    }

    async fn erezept_find_by_prescription_id(
        &self,
        prescription_id: &str,
    ) -> anyhow::Result<Option<Erezept>> {
        erezept::Entity::find()
            .filter(erezept::Column::PrescriptionId.eq(prescription_id))
            .one(&self.db)
            .await?
            .map(to_erezept)
            .transpose()
    }

    async fn erezept_exists_by_id(&self, id: i64) -> anyhow::Result<bool> {
        let count = erezept::Entity::find()
            .filter(erezept::Column::Id.eq(id))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn erezept_exists_by_prescription_id(
        &self,
        prescription_id: &str,
    ) -> anyhow::Result<bool> {
        let count = erezept::Entity::find()
            .filter(erezept::Column::PrescriptionId.eq(prescription_id))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn erezept_insert(&self, erezept: Erezept) -> anyhow::Result<Erezept> {
        let prescription_id = erezept.prescription_id.clone();
        let mut model = to_active_model(erezept)?;
        model.id = NotSet;

        let inserted = model
            .insert(&self.db)
            .await
            .map_err(|e| map_write_error(e, &prescription_id))?;

        tracing::debug!(id = inserted.id, "Inserted prescription");
        to_erezept(inserted)
    }

    async fn erezept_update(&self, erezept: Erezept) -> anyhow::Result<Option<Erezept>> {
        let Some(id) = erezept.id else {
            return Ok(None);
        };
        if !self.erezept_exists_by_id(id).await? {
            return Ok(None);
        }

        let prescription_id = erezept.prescription_id.clone();
        let updated = to_active_model(erezept)?
            .update(&self.db)
            .await
            .map_err(|e| map_write_error(e, &prescription_id))?;

        tracing::debug!(id, "Updated prescription");
        to_erezept(updated).map(Some)
    }

    async fn erezept_delete(&self, id: i64) -> anyhow::Result<bool> {
        let result = erezept::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        self.db.ping().await?;
        Ok(())
    }
}
