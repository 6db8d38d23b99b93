pub mod storage;

pub use storage::{FileStorage, KeyValueStore, MemoryStorage, StorageError};
