//! Editing persisted schedule rows.

pub mod saga;
pub mod update;

pub use saga::{Saga, SagaError, SagaStep};
pub use update::{EditError, ScheduleEditor, ScheduleUpdate, Snapshot};
