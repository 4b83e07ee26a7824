pub mod access;
pub mod matcher;
pub mod mem;
pub mod traits;

pub use access::Records;
pub use mem::InMemoryStore;
pub use traits::*;
