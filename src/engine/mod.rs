pub mod core;
pub mod handle;

pub use core::{AssertOutcome, ContradictionEvent, Engine};
pub use handle::EngineHandle;
