use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::validation::{
    MAX_DOSAGE_LENGTH, MAX_IDENTIFIER_LENGTH, MAX_MEDICATION_NAME_LENGTH,
    validate_future_or_present, validate_not_null, validate_past_or_present, validate_text,
};

/// Lifecycle state of a prescription
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErezeptStatus {
    #[default]
    Created,
    Signed,
    Dispensed,
    Cancelled,
    Expired,
}

impl ErezeptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ErezeptStatus::Created => "CREATED",
            ErezeptStatus::Signed => "SIGNED",
            ErezeptStatus::Dispensed => "DISPENSED",
            ErezeptStatus::Cancelled => "CANCELLED",
            ErezeptStatus::Expired => "EXPIRED",
        }
    }
}

impl Display for ErezeptStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ErezeptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(ErezeptStatus::Created),
            "SIGNED" => Ok(ErezeptStatus::Signed),
            "DISPENSED" => Ok(ErezeptStatus::Dispensed),
            "CANCELLED" => Ok(ErezeptStatus::Cancelled),
            "EXPIRED" => Ok(ErezeptStatus::Expired),
            other => Err(format!("unknown prescription status '{}'", other)),
        }
    }
}

fn default_status() -> Option<ErezeptStatus> {
    Some(ErezeptStatus::Created)
}

/// Treats an explicit JSON `null` like an absent string so that blank checks report it
fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A prescription (ERezept)
///
/// The same shape is used for requests and responses. `id` is assigned by the
/// server. An absent `status` defaults to `CREATED`, while an explicit `null`
/// leaves it unset so updates can keep the stored value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(as = ERezept)]
pub struct Erezept {
    /// Unique identifier
    #[serde(default)]
    #[schema(read_only, example = 123)]
    pub id: Option<i64>,

    /// Medication name
    #[serde(default, deserialize_with = "nullable_string")]
    #[schema(example = "Ibuprofen 400 mg", max_length = 128)]
    pub medication_name: String,

    /// Dosage instructions
    #[serde(default, deserialize_with = "nullable_string")]
    #[schema(example = "1 tablet, 3x daily after meals", max_length = 256)]
    pub dosage: String,

    /// When it was issued (ISO-8601)
    #[serde(default)]
    #[schema(example = "2025-09-22T10:30:00Z")]
    pub issued_at: Option<DateTime<Utc>>,

    /// When it expires (ISO-8601)
    #[serde(default)]
    #[schema(example = "2025-12-31T23:59:59Z")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Current status
    #[serde(default = "default_status")]
    pub status: Option<ErezeptStatus>,

    /// FHIR/PKV patient identifier
    #[serde(default, deserialize_with = "nullable_string")]
    #[schema(example = "PAT-123456", max_length = 64)]
    pub patient_id: String,

    /// Identifier of prescribing practitioner
    #[serde(default, deserialize_with = "nullable_string")]
    #[schema(example = "PRAC-98765", max_length = 64)]
    pub practitioner_id: String,

    /// Prescription identifier
    #[serde(default, deserialize_with = "nullable_string")]
    #[schema(example = "RX-2025-000123", max_length = 64)]
    pub prescription_id: String,
}

impl Default for Erezept {
    fn default() -> Self {
        Self {
            id: None,
            medication_name: String::new(),
            dosage: String::new(),
            issued_at: None,
            expires_at: None,
            status: default_status(),
            patient_id: String::new(),
            practitioner_id: String::new(),
            prescription_id: String::new(),
        }
    }
}

impl Erezept {
    /// Status with the `CREATED` default applied
    pub fn status_or_default(&self) -> ErezeptStatus {
        self.status.unwrap_or_default()
    }

    /// Field rules plus the checks that only apply to a new prescription
    ///
    /// Updates keep the stored `issuedAt`, so only creation requires it.
    pub fn validate_for_create(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };
        if let Err(e) = validate_not_null(self.issued_at.as_ref()) {
            errors.add("issuedAt", e);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Validate for Erezept {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_text(&self.medication_name, MAX_MEDICATION_NAME_LENGTH) {
            errors.add("medicationName", e);
        }
        if let Err(e) = validate_text(&self.dosage, MAX_DOSAGE_LENGTH) {
            errors.add("dosage", e);
        }
        if let Some(Err(e)) = self.issued_at.as_ref().map(validate_past_or_present) {
            errors.add("issuedAt", e);
        }
        if let Some(Err(e)) = self.expires_at.as_ref().map(validate_future_or_present) {
            errors.add("expiresAt", e);
        }
        if let Err(e) = validate_text(&self.patient_id, MAX_IDENTIFIER_LENGTH) {
            errors.add("patientId", e);
        }
        if let Err(e) = validate_text(&self.practitioner_id, MAX_IDENTIFIER_LENGTH) {
            errors.add("practitionerId", e);
        }
        if let Err(e) = validate_text(&self.prescription_id, MAX_IDENTIFIER_LENGTH) {
            errors.add("prescriptionId", e);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
