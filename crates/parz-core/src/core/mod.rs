pub mod supervisor;
pub mod worker_pool;

pub use supervisor::{Supervisor, SupervisorHandle};
pub use worker_pool::WorkerPool;
