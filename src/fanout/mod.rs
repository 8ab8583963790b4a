pub mod batch_writer;
pub mod coordinator;

pub use batch_writer::{apply_batch_write, BatchWriter, BatchWriterConfig, WriteOutcome};
pub use coordinator::{FanoutCoordinator, StepOutcome};
