pub mod channel;
pub mod config;
pub mod diagnostics;
pub mod emit;
pub mod error;
pub mod generate;
pub mod layout;
pub mod model;
pub mod naming;
pub mod protocol;
pub mod target;
pub mod typ;

mod util;

pub use config::GeneratorConfig;
pub use error::{GenerateError, LayoutError, NamingConflictError, PreconditionError, SchemaError};
pub use generate::{generate, write_generation, Generation};
pub use layout::FieldLayout;
pub use model::TypeModel;
pub use target::Target;
