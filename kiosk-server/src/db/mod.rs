//! 持久化层 - 仓储接口与内存实现

pub mod memory;
pub mod repository;

pub use memory::MemoryStore;
pub use repository::{OrderRepository, ProductRepository, RepoError, RepoResult};
