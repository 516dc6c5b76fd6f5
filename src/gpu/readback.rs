//! CPU readback of small GPU buffers

use bytemuck::Pod;

use crate::error::{buffer_mapping_error, RenderResult};

/// MAP_READ staging buffer that GPU data is copied into at the end of a frame
pub struct StagingBuffer {
    buffer: wgpu::Buffer,
    size: u64,
    label: &'static str,
}

impl StagingBuffer {
    pub fn new(device: &wgpu::Device, label: &'static str, size: u64) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            buffer,
            size,
            label,
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Map, copy out and unmap; waits for the device to finish pending work
    pub fn read<T: Pod>(&self, device: &wgpu::Device) -> RenderResult<Vec<T>> {
        let slice = self.buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();

        slice.map_async(wgpu::MapMode::Read, move |result| {
            sender.send(result).ok();
        });
        device.poll(wgpu::Maintain::Wait);

        pollster::block_on(receiver)
            .map_err(|e| buffer_mapping_error(self.label, e))?
            .map_err(|e| buffer_mapping_error(self.label, e))?;

        let values = {
            let data = slice.get_mapped_range();
            let whole = data.len() / std::mem::size_of::<T>() * std::mem::size_of::<T>();
            bytemuck::cast_slice::<u8, T>(&data[..whole]).to_vec()
        };
        self.buffer.unmap();

        Ok(values)
    }

    /// First `T` in the buffer
    pub fn read_one<T: Pod>(&self, device: &wgpu::Device) -> RenderResult<T> {
        self.read::<T>(device)?
            .into_iter()
            .next()
            .ok_or_else(|| buffer_mapping_error(self.label, "staging buffer smaller than value"))
    }
}
