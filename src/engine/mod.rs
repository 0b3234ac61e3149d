//! The batch engine: validation, assembly, processing and response fan-out.

pub mod assembler;
pub mod control;
pub mod runner;
pub mod shutdown;
pub mod validate;

pub use assembler::{Admission, Batch, BatchAssembler, BatchEntry, BatchLimits, CloseReason};
pub use control::{HostStats, WorkerHost};
pub use runner::{BatchOutcome, BatchReport, BatchRunner, ResponseFailure};
pub use shutdown::Shutdown;
pub use validate::{Refusal, TaskCheck, validate_task};
