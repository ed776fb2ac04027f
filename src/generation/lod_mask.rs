//! Iterative quadtree LOD mask pass with crack avoidance.

use bytemuck::{Pod, Zeroable};

use crate::core::error::Error;
use crate::generation::constants::GenerationConstants;
use crate::generation::ChunkBuffers;
use crate::gpu::submit_and_wait;

/// Number of fixed simplification levels.
pub const LOD_DEPTHS: u32 = 5;

/// Curvature tolerance for the collapse test: a cell collapses only while
/// every shading normal inside it satisfies `dot(n, reference) >= 1 - eps`
/// against the corner-average normal.
pub const FLATNESS_EPS: f32 = 0.01;

/// Simplify kernel uniform, shared by mark, cull, and winder. Must match
/// `SimplifyParams` in simplify.wgsl.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SimplifyParams {
    pub blocks: u32,
    pub verts: u32,
    pub cell_width: u32,
    pub q_tree_width: u32,
    pub depth: u32,
    pub flatness_eps: f32,
    pub _pad0: u32,
    pub _pad1: u32,
}

/// Dispatch geometry of one simplification level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthLevel {
    pub depth: u32,
    pub cell_width: u32,
    pub q_tree_width: u32,
}

impl DepthLevel {
    /// Thread-grid dimensions of the quadtree mark dispatch.
    pub fn mark_dims(&self) -> (u32, u32) {
        (self.q_tree_width.saturating_sub(1), self.q_tree_width * 2)
    }

    /// Thread-grid dimensions of the cross-cull dispatch.
    pub fn cull_dims(&self) -> (u32, u32) {
        (self.q_tree_width, self.q_tree_width)
    }
}

/// The five depth levels for a chunk of the given width. Levels whose cell
/// width exceeds the chunk degenerate to a zero quadtree width and dispatch
/// nothing.
pub fn depth_levels(chunk_width_in_blocks: u32) -> Vec<DepthLevel> {
    (0..LOD_DEPTHS)
        .map(|depth| {
            let cell_width = (1u32 << depth) * 2;
            DepthLevel {
                depth,
                cell_width,
                q_tree_width: chunk_width_in_blocks / cell_width,
            }
        })
        .collect()
}

/// Total quadtree cells across all depths; sizes the shared flag buffer.
pub fn flag_cell_count(chunk_width_in_blocks: u32) -> u32 {
    depth_levels(chunk_width_in_blocks)
        .iter()
        .map(|level| level.q_tree_width * level.q_tree_width)
        .sum()
}

/// Runs the iterative quadtree mark / cross-cull loop over the active mask.
pub struct LodMaskPass {
    mark_pipeline: wgpu::ComputePipeline,
    cull_pipeline: wgpu::ComputePipeline,
    params_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl LodMaskPass {
    pub fn new(
        device: &wgpu::Device,
        module: &wgpu::ShaderModule,
        cache: &wgpu::PipelineCache,
        buffers: &ChunkBuffers,
    ) -> Self {
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lod_mask_params"),
            size: std::mem::size_of::<SimplifyParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let (bind_group_layout, bind_group) =
            buffers.simplify_bind_group(device, "lod_mask", &params_buffer);

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lod_mask_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let mark_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("quadtree_mark_pipeline"),
            layout: Some(&pipeline_layout),
            module,
            entry_point: Some("quadtree_mark"),
            compilation_options: Default::default(),
            cache: Some(cache),
        });

        let cull_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("cross_cull_pipeline"),
            layout: Some(&pipeline_layout),
            module,
            entry_point: Some("cross_cull"),
            compilation_options: Default::default(),
            cache: Some(cache),
        });

        Self {
            mark_pipeline,
            cull_pipeline,
            params_buffer,
            bind_group,
        }
    }

    /// Reset the active mask to all-one and clear the cell flags.
    ///
    /// Must run before the first depth of every generation; both buffers are
    /// reused across chunks and carry the previous chunk's state otherwise.
    pub fn reset(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        buffers: &ChunkBuffers,
        ones: &[u32],
    ) -> Result<(), Error> {
        queue.write_buffer(buffers.active_mask.storage(), 0, bytemuck::cast_slice(ones));
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("lod_mask_reset_encoder"),
        });
        encoder.clear_buffer(&buffers.cell_flags, 0, None);
        submit_and_wait(device, queue, encoder)
    }

    /// Run mark + cross-cull for the first `depth_limit` levels, one blocking
    /// submission per level. The full pipeline passes [`LOD_DEPTHS`].
    pub fn run(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        constants: &GenerationConstants,
        depth_limit: u32,
    ) -> Result<(), Error> {
        let blocks = constants.chunk_width_in_blocks;
        for level in depth_levels(blocks)
            .into_iter()
            .take(depth_limit as usize)
        {
            if level.q_tree_width == 0 {
                continue;
            }
            let params = SimplifyParams {
                blocks,
                verts: constants.chunk_width_in_verts(),
                cell_width: level.cell_width,
                q_tree_width: level.q_tree_width,
                depth: level.depth,
                flatness_eps: FLATNESS_EPS,
                _pad0: 0,
                _pad1: 0,
            };
            queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lod_mask_encoder"),
            });
            let (mark_x, mark_y) = level.mark_dims();
            if mark_x > 0 && mark_y > 0 {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("quadtree_mark_pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.mark_pipeline);
                pass.set_bind_group(0, &self.bind_group, &[]);
                pass.dispatch_workgroups((mark_x + 7) / 8, (mark_y + 7) / 8, 1);
            }
            {
                let (cull_x, cull_y) = level.cull_dims();
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("cross_cull_pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.cull_pipeline);
                pass.set_bind_group(0, &self.bind_group, &[]);
                pass.dispatch_workgroups((cull_x + 7) / 8, (cull_y + 7) / 8, 1);
            }
            submit_and_wait(device, queue, encoder)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_levels_64() {
        let levels = depth_levels(64);
        assert_eq!(levels.len(), 5);
        let widths: Vec<u32> = levels.iter().map(|l| l.cell_width).collect();
        assert_eq!(widths, vec![2, 4, 8, 16, 32]);
        let qtws: Vec<u32> = levels.iter().map(|l| l.q_tree_width).collect();
        assert_eq!(qtws, vec![32, 16, 8, 4, 2]);

        assert_eq!(levels[0].mark_dims(), (31, 64));
        assert_eq!(levels[0].cull_dims(), (32, 32));
        assert_eq!(levels[4].mark_dims(), (1, 4));
    }

    #[test]
    fn test_depth_levels_8() {
        let levels = depth_levels(8);
        let qtws: Vec<u32> = levels.iter().map(|l| l.q_tree_width).collect();
        assert_eq!(qtws, vec![4, 2, 1, 0, 0]);

        // q_tree_width 1 dispatches no mark threads; 0 dispatches nothing.
        assert_eq!(levels[2].mark_dims(), (0, 2));
        assert_eq!(levels[3].mark_dims(), (0, 0));
    }

    #[test]
    fn test_flag_cell_count() {
        assert_eq!(flag_cell_count(64), 1024 + 256 + 64 + 16 + 4);
        assert_eq!(flag_cell_count(8), 16 + 4 + 1);
    }
}
