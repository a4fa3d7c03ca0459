pub mod chunk;

pub use chunk::{ChunkInfo, ChunkStore, MAX_CHUNK_BYTES, chunk_file_name};
