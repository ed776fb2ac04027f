//! GPU context management using wgpu

use crate::core::error::Error;

/// Headless GPU compute context
///
/// There is no surface: the pipeline only ever dispatches compute work and
/// reads buffers back. One context is created per process and shared by
/// every [`GenerationContext`](crate::generation::GenerationContext) built
/// from it.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Create a new headless GPU context
    pub async fn new() -> Result<Self, Error> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::Gpu(format!("No suitable adapter found: {:?}", e)))?;

        let adapter_limits = adapter.limits();

        let device_desc = wgpu::DeviceDescriptor {
            label: Some("skyterra_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits {
                max_storage_buffers_per_shader_stage: 8,
                max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
                max_buffer_size: adapter_limits.max_buffer_size,
                ..Default::default()
            },
            memory_hints: wgpu::MemoryHints::Performance,
            experimental_features: Default::default(),
            trace: Default::default(),
        };

        let (device, queue) = adapter
            .request_device(&device_desc)
            .await
            .map_err(|e| Error::Gpu(e.to_string()))?;

        let info = adapter.get_info();
        log::info!(
            "Compute adapter: {} ({:?}), max_buffer_size={}MB",
            info.name,
            info.backend,
            adapter_limits.max_buffer_size / 1024 / 1024
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Create a new context, blocking the current thread
    pub fn new_blocking() -> Result<Self, Error> {
        pollster::block_on(Self::new())
    }
}
