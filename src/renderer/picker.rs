//! Object picking from the `R32Uint` pick target

use crate::error::RenderResult;
use crate::gpu::StagingBuffer;

use super::target::RenderTarget;

/// Copies the pick texel under the mouse into a staging buffer every frame
pub struct Picker {
    staging: StagingBuffer,
    /// Whether the last recorded frame copied a texel
    pending: bool,
}

impl Picker {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            staging: StagingBuffer::new(device, "Pick Staging", wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64),
            pending: false,
        }
    }

    /// Record the copy of texel `(x, y)`; nothing is copied outside the target
    pub fn record(&mut self, encoder: &mut wgpu::CommandEncoder, target: &RenderTarget, x: u32, y: u32) {
        let (width, height) = target.size();
        self.pending = x < width && y < height;
        if !self.pending {
            return;
        }

        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: target.pick(),
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: self.staging.buffer(),
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT),
                    rows_per_image: Some(1),
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Object id under the mouse in the last submitted frame
    pub fn read(&self, device: &wgpu::Device) -> RenderResult<Option<u32>> {
        if !self.pending {
            return Ok(None);
        }
        let value: u32 = self.staging.read_one(device)?;
        // Pick target stores id + 1
        Ok(value.checked_sub(1))
    }
}
