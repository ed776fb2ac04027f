//! Terrain chunk generation pipeline.
//!
//! One [`GenerationContext`] owns the compute device handles, the three
//! compiled kernel programs, and a single chunk's worth of reusable device
//! buffers. [`GenerationContext::generate_chunk`] drives the full pipeline:
//!
//! 1. Heightfield pass — raw positions + UVs from fractal noise
//! 2. Shading pass — packed normal/binormal/tangent fields
//! 3. LOD mask pass — five quadtree mark / cross-cull iterations
//! 4. Index winder pass — raw triangle records from the final mask
//! 5. Readback + assembly — stream compaction into a [`TerrainChunk`]
//!
//! The context is not reentrant: buffers are overwritten in place each call,
//! so a call must fully finish before the next begins. The scheduler
//! enforces this with an exclusive lock held for the whole call.

pub mod assembler;
pub mod constants;
pub mod heightfield;
pub mod lod_mask;
pub mod shading;
pub mod winder;

pub use assembler::{compact, ChunkAssembler, CompactedMesh, MeshVertex, RawChunkData};
pub use constants::GenerationConstants;
pub use heightfield::HeightfieldPass;
pub use lod_mask::{depth_levels, DepthLevel, LodMaskPass, LOD_DEPTHS};
pub use shading::ShadingFieldPass;
pub use winder::IndexWinderPass;

use std::path::Path;
use std::time::Instant;

use crate::core::error::Error;
use crate::gpu::{GpuContext, KernelCache, ReadbackBuffer};
use crate::streaming::scheduler::ChunkPipeline;
use crate::terrain::chunk::{ChunkCoordinate, TerrainChunk};

const HEIGHTFIELD_SRC: &str = include_str!("../../shaders/heightfield.wgsl");
const SHADING_SRC: &str = include_str!("../../shaders/shading.wgsl");
const SIMPLIFY_SRC: &str = include_str!("../../shaders/simplify.wgsl");

/// The WGSL sources of the three kernel programs, in cache-hash order.
pub fn kernel_sources() -> [&'static str; 3] {
    [HEIGHTFIELD_SRC, SHADING_SRC, SIMPLIFY_SRC]
}

/// Device buffers sized for exactly one chunk, reused across generations.
pub struct ChunkBuffers {
    pub positions: ReadbackBuffer,
    pub uvs: ReadbackBuffer,
    pub normals: ReadbackBuffer,
    pub binormals: ReadbackBuffer,
    pub tangents: ReadbackBuffer,
    pub active_mask: ReadbackBuffer,
    /// Per-cell collapse flags for every depth, packed back to back.
    /// Device-internal: the winder consumes them, nothing reads them back.
    pub cell_flags: wgpu::Buffer,
    pub index_stream: ReadbackBuffer,
}

impl ChunkBuffers {
    pub fn new(device: &wgpu::Device, constants: &GenerationConstants) -> Self {
        let verts = constants.chunk_width_in_verts() as u64;
        let blocks = constants.chunk_width_in_blocks as u64;
        let vert_count = verts * verts;

        let cell_flags = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cell_flags"),
            size: (lod_mask::flag_cell_count(constants.chunk_width_in_blocks) as u64 * 4).max(4),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            positions: ReadbackBuffer::new(device, "positions", vert_count * 16),
            uvs: ReadbackBuffer::new(device, "uvs", vert_count * 8),
            normals: ReadbackBuffer::new(device, "normals", vert_count * 8),
            binormals: ReadbackBuffer::new(device, "binormals", vert_count * 4),
            tangents: ReadbackBuffer::new(device, "tangents", vert_count * 4),
            active_mask: ReadbackBuffer::new(device, "active_mask", vert_count * 4),
            cell_flags,
            index_stream: ReadbackBuffer::new(device, "index_stream", blocks * blocks * 8 * 4),
        }
    }

    /// Layout + bind group shared by the simplify program's entry points
    /// (mark, cull, winder).
    pub fn simplify_bind_group(
        &self,
        device: &wgpu::Device,
        name: &str,
        params_buffer: &wgpu::Buffer,
    ) -> (wgpu::BindGroupLayout, wgpu::BindGroup) {
        let storage_entry = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{name}_layout")),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, false),
                storage_entry(4, false),
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{name}_bind_group")),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.normals.storage().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.active_mask.storage().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.cell_flags.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.index_stream.storage().as_entire_binding(),
                },
            ],
        });

        (layout, bind_group)
    }

    fn destroy(&self) {
        self.positions.destroy();
        self.uvs.destroy();
        self.normals.destroy();
        self.binormals.destroy();
        self.tangents.destroy();
        self.active_mask.destroy();
        self.cell_flags.destroy();
        self.index_stream.destroy();
    }
}

/// Owns the compute device handles, the compiled kernel programs, and the
/// reusable chunk buffers.
///
/// Not reentrant: callers must serialize [`generate_chunk`] calls, holding an
/// exclusive lock for the full call (see
/// [`ChunkScheduler`](crate::streaming::scheduler::ChunkScheduler)).
pub struct GenerationContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    constants: GenerationConstants,
    buffers: ChunkBuffers,
    heightfield: HeightfieldPass,
    shading: ShadingFieldPass,
    lod_mask: LodMaskPass,
    winder: IndexWinderPass,
    ones: Vec<u32>,
    disposed: bool,
}

impl GenerationContext {
    /// Compile (or load from cache) the kernel programs and allocate the
    /// chunk buffers. Kernel build failure is fatal and aborts construction.
    pub fn new(
        gpu: &GpuContext,
        constants: GenerationConstants,
        cache_dir: &Path,
    ) -> Result<Self, Error> {
        constants.validate()?;
        let device = gpu.device.clone();
        let queue = gpu.queue.clone();

        let kernel_cache = KernelCache::open(cache_dir, &kernel_sources());
        let pipeline_cache = kernel_cache.device_cache(&device);

        let error_scope = device.push_error_scope(wgpu::ErrorFilter::Validation);

        let heightfield_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("heightfield_shader"),
            source: wgpu::ShaderSource::Wgsl(HEIGHTFIELD_SRC.into()),
        });
        let shading_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shading_shader"),
            source: wgpu::ShaderSource::Wgsl(SHADING_SRC.into()),
        });
        let simplify_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("simplify_shader"),
            source: wgpu::ShaderSource::Wgsl(SIMPLIFY_SRC.into()),
        });

        let buffers = ChunkBuffers::new(&device, &constants);
        let heightfield =
            HeightfieldPass::new(&device, &heightfield_module, &pipeline_cache, &buffers);
        let shading = ShadingFieldPass::new(&device, &shading_module, &pipeline_cache, &buffers);
        let lod_mask = LodMaskPass::new(&device, &simplify_module, &pipeline_cache, &buffers);
        let winder = IndexWinderPass::new(&device, &simplify_module, &pipeline_cache, &buffers);

        if let Some(e) = pollster::block_on(error_scope.pop()) {
            return Err(Error::Gpu(format!("kernel program build failed: {e}")));
        }

        if let Err(e) = kernel_cache.store(&pipeline_cache) {
            log::warn!("failed to persist kernel cache: {e}");
        }

        let ones = vec![1u32; constants.vertex_count() as usize];

        Ok(Self {
            device,
            queue,
            constants,
            buffers,
            heightfield,
            shading,
            lod_mask,
            winder,
            ones,
            disposed: false,
        })
    }

    pub fn constants(&self) -> &GenerationConstants {
        &self.constants
    }

    /// Run the full pipeline for one chunk and read the raw buffers back.
    pub fn generate_raw(&mut self, coord: ChunkCoordinate) -> Result<RawChunkData, Error> {
        self.generate_raw_at_lod(coord, LOD_DEPTHS)
    }

    /// Like [`generate_raw`](Self::generate_raw) but stopping the mask loop
    /// after `depth_limit` levels. Used to inspect intermediate
    /// simplification states.
    pub fn generate_raw_at_lod(
        &mut self,
        coord: ChunkCoordinate,
        depth_limit: u32,
    ) -> Result<RawChunkData, Error> {
        assert!(!self.disposed, "GenerationContext used after dispose");

        let t0 = Instant::now();
        self.heightfield
            .run(&self.device, &self.queue, &self.constants, coord)?;
        let t1 = Instant::now();
        self.shading.run(&self.device, &self.queue, &self.constants)?;
        let t2 = Instant::now();
        self.lod_mask
            .reset(&self.device, &self.queue, &self.buffers, &self.ones)?;
        self.lod_mask
            .run(&self.device, &self.queue, &self.constants, depth_limit)?;
        let t3 = Instant::now();
        self.winder.run(&self.device, &self.queue, &self.constants)?;
        let t4 = Instant::now();

        let raw = self.read_back()?;
        log::debug!(
            "chunk {}: heightfield {:?}, shading {:?}, lod {:?}, winder {:?}, readback {:?}",
            coord,
            t1 - t0,
            t2 - t1,
            t3 - t2,
            t4 - t3,
            t4.elapsed(),
        );
        Ok(raw)
    }

    fn read_back(&self) -> Result<RawChunkData, Error> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback_encoder"),
            });
        self.buffers.positions.enqueue_copy(&mut encoder);
        self.buffers.uvs.enqueue_copy(&mut encoder);
        self.buffers.normals.enqueue_copy(&mut encoder);
        self.buffers.binormals.enqueue_copy(&mut encoder);
        self.buffers.tangents.enqueue_copy(&mut encoder);
        self.buffers.active_mask.enqueue_copy(&mut encoder);
        self.buffers.index_stream.enqueue_copy(&mut encoder);
        self.queue.submit(std::iter::once(encoder.finish()));

        let positions: Vec<[f32; 4]> = self.buffers.positions.read(&self.device)?;
        let uvs: Vec<[f32; 2]> = self.buffers.uvs.read(&self.device)?;
        let normals: Vec<[u32; 2]> = self.buffers.normals.read(&self.device)?;
        let binormals: Vec<u32> = self.buffers.binormals.read(&self.device)?;
        let tangents: Vec<u32> = self.buffers.tangents.read(&self.device)?;
        let mask_words: Vec<u32> = self.buffers.active_mask.read(&self.device)?;
        let index_stream: Vec<i32> = self.buffers.index_stream.read(&self.device)?;

        Ok(RawChunkData {
            verts: self.constants.chunk_width_in_verts(),
            positions,
            uvs,
            normals,
            binormals,
            tangents,
            active_mask: mask_words.iter().map(|&w| (w != 0) as u8).collect(),
            index_stream,
        })
    }

    /// Generate one chunk end to end.
    pub fn generate_chunk(&mut self, coord: ChunkCoordinate) -> Result<TerrainChunk, Error> {
        let start = Instant::now();
        let raw = self.generate_raw(coord)?;
        let chunk = ChunkAssembler::assemble(&self.device, &self.queue, coord, &raw)?;
        log::info!(
            "chunk {}: {} verts, {} tris in {:?}",
            coord,
            chunk.vertex_count,
            chunk.triangle_count(),
            start.elapsed(),
        );
        Ok(chunk)
    }

    /// Destroy the context's device buffers. Panics on a second call.
    pub fn dispose(&mut self) {
        assert!(!self.disposed, "GenerationContext disposed twice");
        self.disposed = true;
        self.buffers.destroy();
        log::debug!("generation context disposed");
    }
}

impl ChunkPipeline for GenerationContext {
    type Chunk = TerrainChunk;

    fn generate_chunk(&mut self, coord: ChunkCoordinate) -> Result<TerrainChunk, Error> {
        GenerationContext::generate_chunk(self, coord)
    }

    fn dispose_chunk(&mut self, chunk: &mut TerrainChunk) {
        chunk.dispose();
    }

    fn dispose(&mut self) {
        GenerationContext::dispose(self);
    }
}
