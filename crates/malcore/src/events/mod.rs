// crates/malcore/src/events/mod.rs

mod execution;
mod trigger;

pub use execution::{ExecutionEvent, ExecutionEvents};
pub use trigger::{TriggerContext, MANUAL_TRIGGER};
