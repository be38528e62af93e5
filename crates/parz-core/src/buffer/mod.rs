pub mod pool;

pub use pool::{BlockPool, PoolMetricsSnapshot, PooledBlock};
