pub mod identity;
pub mod state;

pub use identity::{compute_task_id, TaskId};
pub use state::{TaskState, TaskStateStore};
