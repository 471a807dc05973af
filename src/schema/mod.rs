pub mod builder;
pub mod introspect;
pub mod render;

pub use builder::StatementBuilder;
pub use introspect::{IndexInfo, IndexLookup, IntrospectionError, SchemaIntrospector};
pub use render::IndexKind;
