//! Chunk identity and the renderer-facing finished chunk.

use glam::Vec2;

use crate::generation::constants::GenerationConstants;

/// Integer coordinate identifying a chunk in the tileable world grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkCoordinate {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoordinate {
    /// Create a new chunk coordinate
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// World-space offset of this chunk's minimum corner
    pub fn world_offset(&self, constants: &GenerationConstants) -> Vec2 {
        let width = constants.chunk_width_in_meters();
        Vec2::new(self.x as f32 * width, self.z as f32 * width)
    }
}

impl std::fmt::Display for ChunkCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// A finished, renderer-ready terrain chunk.
///
/// Owns the compacted vertex/index buffers and the three shading textures.
/// The owner must call [`dispose`](TerrainChunk::dispose) exactly once when
/// the chunk is unloaded; dropping without dispose leaks until the device
/// reclaims them, and a second dispose is a programmer error.
pub struct TerrainChunk {
    pub coord: ChunkCoordinate,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub normal_texture: wgpu::Texture,
    pub binormal_texture: wgpu::Texture,
    pub tangent_texture: wgpu::Texture,
    pub normal_view: wgpu::TextureView,
    pub binormal_view: wgpu::TextureView,
    pub tangent_view: wgpu::TextureView,
    pub vertex_count: u32,
    pub index_count: u32,
    disposed: bool,
}

impl TerrainChunk {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        coord: ChunkCoordinate,
        vertex_buffer: wgpu::Buffer,
        index_buffer: wgpu::Buffer,
        normal_texture: wgpu::Texture,
        binormal_texture: wgpu::Texture,
        tangent_texture: wgpu::Texture,
        vertex_count: u32,
        index_count: u32,
    ) -> Self {
        let normal_view = normal_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let binormal_view = binormal_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let tangent_view = tangent_texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            coord,
            vertex_buffer,
            index_buffer,
            normal_texture,
            binormal_texture,
            tangent_texture,
            normal_view,
            binormal_view,
            tangent_view,
            vertex_count,
            index_count,
            disposed: false,
        }
    }

    /// Number of triangles in the compacted mesh
    pub fn triangle_count(&self) -> u32 {
        self.index_count / 3
    }

    /// Release all device resources owned by this chunk.
    ///
    /// Panics on a second call: double-dispose is a programmer error, not a
    /// recoverable condition.
    pub fn dispose(&mut self) {
        assert!(
            !self.disposed,
            "TerrainChunk {} disposed twice",
            self.coord
        );
        self.disposed = true;
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
        self.normal_texture.destroy();
        self.binormal_texture.destroy();
        self.tangent_texture.destroy();
        log::debug!("chunk {}: disposed", self.coord);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_identity() {
        let a = ChunkCoordinate::new(3, -2);
        let b = ChunkCoordinate::new(3, -2);
        assert_eq!(a, b);
        assert_ne!(a, ChunkCoordinate::new(-2, 3));
    }

    #[test]
    fn test_world_offset() {
        let constants = GenerationConstants {
            block_width: 2.0,
            chunk_width_in_blocks: 64,
            ..Default::default()
        };
        let offset = ChunkCoordinate::new(1, 0).world_offset(&constants);
        assert_eq!(offset, Vec2::new(128.0, 0.0));

        let offset = ChunkCoordinate::new(-2, 3).world_offset(&constants);
        assert_eq!(offset, Vec2::new(-256.0, 384.0));
    }
}
