pub mod clock;
pub mod tracing;
