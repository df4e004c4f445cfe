mod completion;
mod task;

pub use completion::{CompletionStatus, TaskCompletion};
pub use task::{Priority, Recurrence, Task, TaskSummary};
