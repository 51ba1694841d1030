pub mod pages;
pub mod workflow;

pub use pages::{PageSetState, PageSync};
pub use workflow::{ExecutionSync, WorkflowExecutionState};
