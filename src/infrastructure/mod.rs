pub mod directory;
pub mod in_memory;
pub mod outbound;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
