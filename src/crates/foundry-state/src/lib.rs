//! Execution state and checkpoint persistence for the Foundry engine
//!
//! The interpreter owns exactly one [`ExecutionState`] per run and
//! checkpoints it after every step through a [`StateSaver`] backend. The
//! state is plain serializable data, so `load(save(S)) == S` holds for any
//! backend that stores the blob faithfully — the in-memory reference backend
//! here, or the SQLite saver in the server crate.

pub mod memory;
pub mod saver;
pub mod state;
pub mod status;

pub use memory::InMemoryStateSaver;
pub use saver::{Result, SaverError, StateSaver};
pub use state::{ExecutionError, ExecutionState, StepRecord, StepStatus};
pub use status::ExecutionStatus;
