//! Chunk scheduling and lifetime management

pub mod scheduler;

pub use scheduler::{ChunkPipeline, ChunkScheduler};
