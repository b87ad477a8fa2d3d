pub mod memory;
pub mod store;
pub mod valkey;

pub use memory::MemoryReplayStore;
pub use store::{ReplayError, ReplayStore};
pub use valkey::ValkeyReplayStore;
