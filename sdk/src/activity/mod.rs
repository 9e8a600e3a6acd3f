//! Activity definitions and execution context

pub mod context;
pub mod definition;

pub use context::{ActivityContext, ActivityContextExt, ActivityContextImpl, ActivityInfo};
pub use definition::ActivityDefinition;
