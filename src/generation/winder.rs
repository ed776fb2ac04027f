//! Index winding compute pass.

use crate::core::error::Error;
use crate::generation::constants::GenerationConstants;
use crate::generation::lod_mask::{SimplifyParams, FLATNESS_EPS};
use crate::generation::ChunkBuffers;
use crate::gpu::submit_and_wait;

/// Emits the raw triangle index stream from the final active mask.
///
/// One record of four ints per (cell, slot); slots that carry no triangle
/// are written as all -1. Vertex index 0 is a legitimate triangle corner, so
/// the sentinel lives out of range rather than at zero.
pub struct IndexWinderPass {
    pipeline: wgpu::ComputePipeline,
    params_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl IndexWinderPass {
    pub fn new(
        device: &wgpu::Device,
        module: &wgpu::ShaderModule,
        cache: &wgpu::PipelineCache,
        buffers: &ChunkBuffers,
    ) -> Self {
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("winder_params"),
            size: std::mem::size_of::<SimplifyParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let (bind_group_layout, bind_group) =
            buffers.simplify_bind_group(device, "winder", &params_buffer);

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("winder_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("wind_indices_pipeline"),
            layout: Some(&pipeline_layout),
            module,
            entry_point: Some("wind_indices"),
            compilation_options: Default::default(),
            cache: Some(cache),
        });

        Self {
            pipeline,
            params_buffer,
            bind_group,
        }
    }

    /// Run the pass over `(blocks, blocks * 2)` threads and block until done.
    pub fn run(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        constants: &GenerationConstants,
    ) -> Result<(), Error> {
        let blocks = constants.chunk_width_in_blocks;
        let params = SimplifyParams {
            blocks,
            verts: constants.chunk_width_in_verts(),
            cell_width: 0,
            q_tree_width: 0,
            depth: 0,
            flatness_eps: FLATNESS_EPS,
            _pad0: 0,
            _pad1: 0,
        };
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("winder_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("wind_indices_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups((blocks + 7) / 8, (blocks * 2 + 7) / 8, 1);
        }
        submit_and_wait(device, queue, encoder)
    }
}
