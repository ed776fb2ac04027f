//! Shading field compute pass.

use bytemuck::{Pod, Zeroable};

use crate::core::error::Error;
use crate::generation::constants::GenerationConstants;
use crate::generation::ChunkBuffers;
use crate::gpu::submit_and_wait;

/// Shading kernel uniform. Must match `ShadingParams` in shading.wgsl.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ShadingParams {
    pub verts: u32,
    pub blocks: u32,
    pub block_width: f32,
    pub _pad: u32,
}

/// Derives packed normal/binormal/tangent fields from the heightfield.
///
/// Must run strictly after the heightfield pass for the same chunk; the
/// kernel reads neighboring heightfield values for its central differences.
pub struct ShadingFieldPass {
    pipeline: wgpu::ComputePipeline,
    params_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl ShadingFieldPass {
    pub fn new(
        device: &wgpu::Device,
        module: &wgpu::ShaderModule,
        cache: &wgpu::PipelineCache,
        buffers: &ChunkBuffers,
    ) -> Self {
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shading_params"),
            size: std::mem::size_of::<ShadingParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

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

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shading_layout"),
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
            label: Some("shading_bind_group"),
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
                    resource: buffers.normals.storage().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: buffers.binormals.storage().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: buffers.tangents.storage().as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shading_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("shading_pipeline"),
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

    /// Run the pass and block until the device is done.
    pub fn run(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        constants: &GenerationConstants,
    ) -> Result<(), Error> {
        let params = ShadingParams {
            verts: constants.chunk_width_in_verts(),
            blocks: constants.chunk_width_in_blocks,
            block_width: constants.block_width,
            _pad: 0,
        };
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("shading_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("shading_pass"),
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
