pub mod walk;

pub use walk::{discover_archives, discover_entries, partition_shards};
