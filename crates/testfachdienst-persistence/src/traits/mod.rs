//! Persistence trait definitions

mod erezept;

pub use erezept::ErezeptPersistence;
