pub mod engine;
pub mod lamport;

pub use engine::{Store, Value};
pub use lamport::LamportClock;
