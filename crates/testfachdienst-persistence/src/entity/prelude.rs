pub use super::erezept::Entity as ErezeptEntity;
