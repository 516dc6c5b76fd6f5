//! GPU plumbing: device creation, shared buffer layouts, binding helpers,
//! readback and the upload ring.

pub mod bindings;
pub mod buffer_layouts;
pub mod context;
pub mod readback;
pub mod upload_ring;

pub use context::GpuContext;
pub use readback::StagingBuffer;
pub use upload_ring::UploadRing;

use wgpu::util::DeviceExt;

/// Create a buffer initialised from a slice of `Pod` values.
///
/// wgpu rejects zero-sized bindings, so empty slices produce a buffer holding
/// a single zeroed element.
pub fn create_buffer_init<T: bytemuck::Pod>(
    device: &wgpu::Device,
    label: &str,
    contents: &[T],
    usage: wgpu::BufferUsages,
) -> wgpu::Buffer {
    let placeholder = [T::zeroed()];
    let contents = if contents.is_empty() {
        &placeholder[..]
    } else {
        contents
    };

    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(contents),
        usage,
    })
}
