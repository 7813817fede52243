//! `SeaORM` Entity for erezept table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "erezept")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(column_type = "String(StringLen::N(128))")]
    pub medication_name: String,
    #[sea_orm(column_type = "String(StringLen::N(256))")]
    pub dosage: String,
    pub issued_at: DateTimeUtc,
    #[sea_orm(nullable)]
    pub expires_at: Option<DateTimeUtc>,
    #[sea_orm(column_type = "String(StringLen::N(16))")]
    pub status: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub patient_id: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub practitioner_id: String,
    #[sea_orm(column_type = "String(StringLen::N(64))", unique)]
    pub prescription_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
