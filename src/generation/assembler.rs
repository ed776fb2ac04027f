//! CPU-side readback assembly: stream compaction and chunk upload.

use bytemuck::{Pod, Zeroable};

use crate::core::error::Error;
use crate::terrain::chunk::{ChunkCoordinate, TerrainChunk};

/// Alpha sentinel written into the packed 4x8 shading words before upload.
const SHADING_ALPHA_ONE: u32 = 0xFF00_0000;
/// f16 1.0 in the high half of the second packed normal word.
const NORMAL_W_ONE: u32 = 0x3C00_0000;

/// One chunk's worth of raw buffers read back from the device.
#[derive(Clone, Debug, PartialEq)]
pub struct RawChunkData {
    pub verts: u32,
    pub positions: Vec<[f32; 4]>,
    pub uvs: Vec<[f32; 2]>,
    pub normals: Vec<[u32; 2]>,
    pub binormals: Vec<u32>,
    pub tangents: Vec<u32>,
    /// One byte per vertex, 1 = retained
    pub active_mask: Vec<u8>,
    /// 4-int records, two per grid cell; first component < 0 marks an
    /// empty slot
    pub index_stream: Vec<i32>,
}

impl RawChunkData {
    /// Number of vertices the active mask retains.
    pub fn active_count(&self) -> usize {
        self.active_mask.iter().filter(|&&a| a != 0).count()
    }
}

/// Final compacted vertex layout: position + UV.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

/// Renderer-ready mesh: survivor-ordered vertices and renumbered triangle
/// indices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompactedMesh {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl CompactedMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Compact the raw buffers into a renderable mesh.
///
/// Vertices keep their row-major order; indices are remapped into the
/// compacted vertex space. Records whose first component is negative are
/// the winder's empty-slot sentinel and are skipped.
pub fn compact(raw: &RawChunkData) -> CompactedMesh {
    let vert_total = raw.active_mask.len();
    let mut remap = vec![u32::MAX; vert_total];
    let mut vertices = Vec::with_capacity(raw.active_count());
    let mut next = 0u32;
    for i in 0..vert_total {
        if raw.active_mask[i] != 0 {
            remap[i] = next;
            next += 1;
            let p = raw.positions[i];
            vertices.push(MeshVertex {
                position: [p[0], p[1], p[2]],
                uv: raw.uvs[i],
            });
        }
    }

    let mut indices = Vec::new();
    for record in raw.index_stream.chunks_exact(4) {
        if record[0] < 0 {
            continue;
        }
        let mut tri = [0u32; 3];
        let mut valid = true;
        for (k, &r) in record[..3].iter().enumerate() {
            let mapped = usize::try_from(r)
                .ok()
                .and_then(|i| remap.get(i).copied())
                .unwrap_or(u32::MAX);
            if mapped == u32::MAX {
                valid = false;
                break;
            }
            tri[k] = mapped;
        }
        debug_assert!(valid, "winder emitted an inactive or out-of-range vertex");
        if valid {
            indices.extend_from_slice(&tri);
        }
    }

    CompactedMesh { vertices, indices }
}

/// Builds device-resident chunks from raw readback data.
pub struct ChunkAssembler;

impl ChunkAssembler {
    /// Compact the raw data and upload vertex/index buffers plus the three
    /// shading textures, yielding a finished [`TerrainChunk`].
    pub fn assemble(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        coord: ChunkCoordinate,
        raw: &RawChunkData,
    ) -> Result<TerrainChunk, Error> {
        let mesh = compact(raw);

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&mesh.vertices);
        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("chunk_vertices"),
            size: (vertex_bytes.len() as u64).max(4),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if !vertex_bytes.is_empty() {
            queue.write_buffer(&vertex_buffer, 0, vertex_bytes);
        }

        let index_bytes: &[u8] = bytemuck::cast_slice(&mesh.indices);
        let index_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("chunk_indices"),
            size: (index_bytes.len() as u64).max(4),
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if !index_bytes.is_empty() {
            queue.write_buffer(&index_buffer, 0, index_bytes);
        }

        // The kernels leave a sentinel in the fourth channel of each packed
        // shading value; the renderer expects a constant one there.
        let normals: Vec<[u32; 2]> = raw
            .normals
            .iter()
            .map(|n| [n[0], (n[1] & 0x0000_FFFF) | NORMAL_W_ONE])
            .collect();
        let binormals: Vec<u32> = raw.binormals.iter().map(|b| b | SHADING_ALPHA_ONE).collect();
        let tangents: Vec<u32> = raw.tangents.iter().map(|t| t | SHADING_ALPHA_ONE).collect();

        let verts = raw.verts;
        let normal_texture = Self::upload_texture(
            device,
            queue,
            "chunk_normal_map",
            wgpu::TextureFormat::Rgba16Float,
            verts,
            bytemuck::cast_slice(&normals),
        );
        let binormal_texture = Self::upload_texture(
            device,
            queue,
            "chunk_binormal_map",
            wgpu::TextureFormat::Rgba8Unorm,
            verts,
            bytemuck::cast_slice(&binormals),
        );
        let tangent_texture = Self::upload_texture(
            device,
            queue,
            "chunk_tangent_map",
            wgpu::TextureFormat::Rgba8Unorm,
            verts,
            bytemuck::cast_slice(&tangents),
        );

        Ok(TerrainChunk::new(
            coord,
            vertex_buffer,
            index_buffer,
            normal_texture,
            binormal_texture,
            tangent_texture,
            mesh.vertices.len() as u32,
            mesh.indices.len() as u32,
        ))
    }

    fn upload_texture(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        format: wgpu::TextureFormat,
        verts: u32,
        data: &[u8],
    ) -> wgpu::Texture {
        let size = wgpu::Extent3d {
            width: verts,
            height: verts,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let bytes_per_pixel = data.len() as u32 / (verts * verts);
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(verts * bytes_per_pixel),
                rows_per_image: Some(verts),
            },
            size,
        );
        texture
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 3x3 vertex grid (2x2 blocks) with synthetic heights.
    fn raw_grid(active: [u8; 9], index_stream: Vec<i32>) -> RawChunkData {
        let mut positions = Vec::new();
        let mut uvs = Vec::new();
        for z in 0..3 {
            for x in 0..3 {
                positions.push([x as f32, (x + z) as f32 * 0.1, z as f32, 1.0]);
                uvs.push([x as f32 / 2.0, z as f32 / 2.0]);
            }
        }
        RawChunkData {
            verts: 3,
            positions,
            uvs,
            normals: vec![[0, 0]; 9],
            binormals: vec![0; 9],
            tangents: vec![0; 9],
            active_mask: active.to_vec(),
            index_stream,
        }
    }

    const S: i32 = -1;

    #[test]
    fn test_compact_full_grid() {
        // All vertices active, one quad in the lower-left cell.
        let raw = raw_grid(
            [1; 9],
            vec![0, 1, 4, S, 0, 4, 3, S],
        );
        let mesh = compact(&raw);
        assert_eq!(mesh.vertices.len(), 9);
        assert_eq!(mesh.indices, vec![0, 1, 4, 0, 4, 3]);
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn test_compact_skips_sentinel_records() {
        let raw = raw_grid(
            [1; 9],
            vec![S, S, S, S, 0, 1, 4, S, S, S, S, S],
        );
        let mesh = compact(&raw);
        assert_eq!(mesh.indices.len(), 3);
    }

    #[test]
    fn test_vertex_zero_is_a_real_triangle_corner() {
        // A triangle touching vertex 0 must survive: the sentinel is out of
        // range, not the zero record the original convention used.
        let raw = raw_grid([1; 9], vec![0, 0, 0, S]);
        // Degenerate but addressable; all three corners map to vertex 0.
        let mesh = compact(&raw);
        assert_eq!(mesh.indices, vec![0, 0, 0]);
    }

    #[test]
    fn test_compact_renumbers_into_survivor_space() {
        // Deactivate the center vertex (index 4); triangle uses 0, 5, 8.
        let mut active = [1u8; 9];
        active[4] = 0;
        let raw = raw_grid(active, vec![0, 5, 8, S]);
        let mesh = compact(&raw);
        assert_eq!(mesh.vertices.len(), 8);
        // Survivor order: 0..3 keep their index, 5 -> 4, 8 -> 7.
        assert_eq!(mesh.indices, vec![0, 4, 7]);
        for &i in &mesh.indices {
            assert!((i as usize) < mesh.vertices.len());
        }
    }

    #[test]
    fn test_compact_preserves_row_major_vertex_order() {
        let mut active = [0u8; 9];
        active[2] = 1;
        active[6] = 1;
        active[7] = 1;
        let raw = raw_grid(active, vec![]);
        let mesh = compact(&raw);
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.vertices[0].position[0], 2.0); // vertex 2 = (2, 0)
        assert_eq!(mesh.vertices[1].position[2], 2.0); // vertex 6 = (0, 2)
        assert_eq!(mesh.vertices[2].uv, [0.5, 1.0]); // vertex 7 = (1, 2)
    }

    #[test]
    fn test_compact_empty_stream() {
        let raw = raw_grid([1; 9], vec![S; 16]);
        let mesh = compact(&raw);
        assert_eq!(mesh.vertices.len(), 9);
        assert!(mesh.indices.is_empty());
    }

    #[test]
    fn test_index_count_divisible_by_three() {
        let raw = raw_grid(
            [1; 9],
            vec![0, 1, 4, S, S, S, S, S, 1, 2, 5, S, 4, 5, 8, S],
        );
        let mesh = compact(&raw);
        assert_eq!(mesh.indices.len() % 3, 0);
        assert_eq!(mesh.triangle_count(), 3);
    }

    #[test]
    fn test_active_count_bound() {
        let raw = raw_grid([1; 9], vec![]);
        assert!(raw.active_count() <= 9);
        let mesh = compact(&raw);
        assert!(mesh.vertices.len() <= 9);
    }
}
