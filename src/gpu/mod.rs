//! GPU device plumbing: headless context, kernel cache, readback

pub mod context;
pub mod kernel_cache;
pub mod readback;

pub use context::GpuContext;
pub use kernel_cache::KernelCache;
pub use readback::ReadbackBuffer;

use crate::core::error::Error;

/// Submit one encoder and block until the device has executed it.
///
/// Every pipeline pass goes through here: the pipeline is specified as one
/// full device round trip per pass, which is what the context lock
/// serializes.
pub fn submit_and_wait(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    encoder: wgpu::CommandEncoder,
) -> Result<(), Error> {
    queue.submit(std::iter::once(encoder.finish()));
    device
        .poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })
        .map_err(|e| Error::Gpu(format!("device poll failed: {:?}", e)))?;
    Ok(())
}
