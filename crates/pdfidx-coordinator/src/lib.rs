pub mod coordinator;
pub mod pool;
pub mod progress;

pub use coordinator::IndexCoordinator;
pub use pool::{PoolResultState, TasksPool, assert_continue, check_cancel};
pub use progress::{ProgressBus, ProgressEvent, spawn_heartbeat};
