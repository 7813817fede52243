//! Testfachdienst Persistence - Database entities and persistence layer
//!
//! This crate provides:
//! - SeaORM entity definitions
//! - Persistence trait abstractions
//! - The SQL backend (SQLite/PostgreSQL via SeaORM) and schema bootstrap

pub mod entity;
pub mod sql;
pub mod traits;

// Re-export sea-orm for convenience
pub use sea_orm;

// Re-export entity prelude
pub use entity::prelude::*;

// Re-export persistence traits
pub use traits::ErezeptPersistence;

// Re-export SQL backend
pub use sql::{SqlPersistService, ensure_schema};
