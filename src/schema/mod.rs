pub mod guard;

pub use guard::{SchemaGuard, SchemaReport};
