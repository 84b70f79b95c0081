pub mod serial_fields;

pub use serial_fields::{InMemoryBackend, SerialFields};
