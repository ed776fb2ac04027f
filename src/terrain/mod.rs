//! Terrain chunk types

pub mod chunk;

pub use chunk::{ChunkCoordinate, TerrainChunk};
