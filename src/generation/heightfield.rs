//! Heightfield compute pass.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::core::error::Error;
use crate::generation::constants::GenerationConstants;
use crate::generation::ChunkBuffers;
use crate::gpu::submit_and_wait;
use crate::terrain::chunk::ChunkCoordinate;

/// Heightfield kernel uniform. Must match `HeightfieldParams` in
/// heightfield.wgsl.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct HeightfieldParams {
    pub world_offset: [f32; 2],
    pub horizontal_scale: f32,
    pub vertical_scale: f32,
    pub lacunarity: f32,
    pub gain: f32,
    pub noise_offset: f32,
    pub block_width: f32,
    pub verts: u32,
    pub blocks: u32,
    pub octaves: u32,
    pub _pad: u32,
}

impl HeightfieldParams {
    pub fn new(constants: &GenerationConstants, world_offset: Vec2) -> Self {
        Self {
            world_offset: world_offset.to_array(),
            horizontal_scale: constants.horizontal_scale,
            vertical_scale: constants.vertical_scale,
            lacunarity: constants.lacunarity,
            gain: constants.gain,
            noise_offset: constants.offset,
            block_width: constants.block_width,
            verts: constants.chunk_width_in_verts(),
            blocks: constants.chunk_width_in_blocks,
            octaves: constants.octaves,
            _pad: 0,
        }
    }
}

/// Dispatches the heightfield kernel over the chunk vertex grid, writing raw
/// positions and UVs into the context's reusable buffers.
pub struct HeightfieldPass {
    pipeline: wgpu::ComputePipeline,
    params_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl HeightfieldPass {
    pub fn new(
        device: &wgpu::Device,
        module: &wgpu::ShaderModule,
        cache: &wgpu::PipelineCache,
        buffers: &ChunkBuffers,
    ) -> Self {
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("heightfield_params"),
            size: std::mem::size_of::<HeightfieldParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("heightfield_layout"),
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
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("heightfield_bind_group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.positions.storage().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffers.uvs.storage().as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("heightfield_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("heightfield_pipeline"),
            layout: Some(&pipeline_layout),
            module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: Some(cache),
        });

        Self {
            pipeline,
            params_buffer,
            bind_group,
        }
    }

    /// Run the pass for one chunk and block until the device is done.
    pub fn run(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        constants: &GenerationConstants,
        coord: ChunkCoordinate,
    ) -> Result<(), Error> {
        let params = HeightfieldParams::new(constants, coord.world_offset(constants));
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("heightfield_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("heightfield_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            let verts = constants.chunk_width_in_verts();
            pass.dispatch_workgroups((verts + 7) / 8, (verts + 7) / 8, 1);
        }
        submit_and_wait(device, queue, encoder)
    }
}
