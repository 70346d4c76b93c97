pub mod model;
pub mod persist;
pub mod store;

pub use model::{ChunkMeta, Index, IndexStats};
pub use persist::CHUNK_SEPARATOR;
pub use store::IndexStore;
