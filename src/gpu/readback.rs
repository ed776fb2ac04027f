//! Synchronous staging-buffer readback.

use crate::core::error::Error;

/// A storage buffer paired with a staging buffer for CPU readback.
///
/// The pipeline overwrites the storage side every generation; the staging
/// side only exists so the assembler can map the results after the final
/// pass. Each `read` is a full blocking round trip to the device, which is
/// what serializes the pipeline (see the context locking discipline).
pub struct ReadbackBuffer {
    storage: wgpu::Buffer,
    staging: wgpu::Buffer,
    size: u64,
}

impl ReadbackBuffer {
    /// Create a storage buffer of `size` bytes plus its staging twin.
    pub fn new(device: &wgpu::Device, label: &str, size: u64) -> Self {
        let storage = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label}_staging")),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            storage,
            staging,
            size,
        }
    }

    /// The device-visible storage buffer.
    pub fn storage(&self) -> &wgpu::Buffer {
        &self.storage
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Enqueue a copy of the storage contents into the staging buffer.
    pub fn enqueue_copy(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_buffer_to_buffer(&self.storage, 0, &self.staging, 0, self.size);
    }

    /// Map the staging buffer and return its contents as typed elements.
    ///
    /// Must be called after the copy submitted by `enqueue_copy` — blocks
    /// until the device has finished all outstanding work.
    pub fn read<T: bytemuck::Pod>(&self, device: &wgpu::Device) -> Result<Vec<T>, Error> {
        let slice = self.staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| Error::Gpu(format!("device poll failed: {:?}", e)))?;

        rx.recv()
            .map_err(|_| Error::Gpu("readback callback dropped".into()))?
            .map_err(|e| Error::Gpu(format!("buffer map failed: {:?}", e)))?;

        let data = slice.get_mapped_range();
        let out = bytemuck::cast_slice::<u8, T>(&data).to_vec();
        drop(data);
        self.staging.unmap();
        Ok(out)
    }

    /// Destroy both buffers.
    pub fn destroy(&self) {
        self.storage.destroy();
        self.staging.destroy();
    }
}
