pub mod error;
pub mod types;

pub use error::{Result, SerialError};
pub use types::{FieldDescriptor, InstanceDescriptor, ManagedField, Serial};
