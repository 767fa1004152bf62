//! Schema descriptors and live-schema introspection

pub mod introspect;
pub mod table;

pub use introspect::{SchemaIndex, SchemaIntrospector};
pub use table::TableDescriptor;
