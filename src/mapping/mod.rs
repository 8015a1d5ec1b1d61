//! Mapping descriptors and the immutable mapping tree built from them.

pub mod loader;
pub mod model;
pub mod types;

pub use loader::{load_descriptor, ConfigError};
pub use model::{foreign_key_column, is_identifier, Column, GroupId, GroupNode, MappingTree};
pub use types::{ColumnDef, DescriptorDef, GroupDef, NamespaceDef};
