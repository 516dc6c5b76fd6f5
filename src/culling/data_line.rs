//! Append-only GPU data lines
//!
//! A data line is one storage buffer: a small header holding the atomic
//! append counter and an overflow flag, followed by `capacity` fixed-size
//! records. Shaders take the capacity from `arrayLength`, saturate the counter
//! at capacity and set the overflow flag for every dropped append.
//!
//! Lines are reset by copying zeroes over the header from a shared
//! [`ZeroSource`]; record storage is never cleared.

use crate::culling::buffer_math::BufferMath;
use crate::gpu::buffer_layouts::{sizes, DrawLineHeader, WindowArgs};

/// Largest header any line carries
const ZERO_SOURCE_SIZE: u64 = 256;

/// Shared COPY_SRC buffer of zeroes used to reset headers and windows
pub struct ZeroSource {
    buffer: wgpu::Buffer,
}

impl ZeroSource {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Zero Source"),
            size: ZERO_SOURCE_SIZE,
            usage: wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: true,
        });
        // Mapped-at-creation contents start zeroed
        buffer.unmap();
        Self { buffer }
    }

    /// Record a copy zeroing `size` bytes of `target` at `offset`
    pub fn zero(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::Buffer, offset: u64, size: u64) {
        debug_assert!(size <= ZERO_SOURCE_SIZE);
        encoder.copy_buffer_to_buffer(&self.buffer, 0, target, offset, size);
    }
}

/// Buffer + capacity shared by every line kind
struct LineStorage {
    buffer: wgpu::Buffer,
    capacity: u32,
    header_size: u64,
    record_size: u64,
    usage: wgpu::BufferUsages,
    label: String,
}

impl LineStorage {
    fn new(
        device: &wgpu::Device,
        label: &str,
        capacity: u32,
        header_size: u64,
        record_size: u64,
        usage: wgpu::BufferUsages,
    ) -> Self {
        let buffer = Self::create(device, label, capacity, header_size, record_size, usage);
        Self {
            buffer,
            capacity,
            header_size,
            record_size,
            usage,
            label: label.to_string(),
        }
    }

    fn create(
        device: &wgpu::Device,
        label: &str,
        capacity: u32,
        header_size: u64,
        record_size: u64,
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        // Zero-capacity lines still need one record for a valid binding
        let records = capacity.max(1) as u64;
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: header_size + records * record_size,
            usage,
            mapped_at_creation: false,
        })
    }

    fn resize(&mut self, device: &wgpu::Device, capacity: u32) -> bool {
        if capacity == self.capacity {
            return false;
        }
        log::debug!(
            "[DataLine::resize] {} {} -> {} records",
            self.label,
            self.capacity,
            capacity
        );
        self.buffer = Self::create(
            device,
            &self.label,
            capacity,
            self.header_size,
            self.record_size,
            self.usage,
        );
        self.capacity = capacity;
        true
    }
}

/// Append line of [`ClusterRecord`](crate::gpu::buffer_layouts::ClusterRecord)s
pub struct ClusterDataLine {
    storage: LineStorage,
}

impl ClusterDataLine {
    pub fn new(device: &wgpu::Device, label: &str, capacity: u32) -> Self {
        Self {
            storage: LineStorage::new(
                device,
                label,
                capacity,
                sizes::LINE_HEADER,
                sizes::CLUSTER_RECORD,
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            ),
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.storage.buffer
    }

    pub fn capacity(&self) -> u32 {
        self.storage.capacity
    }

    /// Zero the counter and overflow flag
    pub fn reset(&self, encoder: &mut wgpu::CommandEncoder, zero: &ZeroSource) {
        zero.zero(encoder, &self.storage.buffer, 0, sizes::LINE_HEADER);
    }

    /// Recreate storage for `capacity` records; contents are discarded
    pub fn resize(&mut self, device: &wgpu::Device, capacity: u32) -> bool {
        self.storage.resize(device, capacity)
    }
}

/// Append line of expanded index values; the records double as an index buffer
pub struct IndexDataLine {
    storage: LineStorage,
}

impl IndexDataLine {
    pub fn new(device: &wgpu::Device, label: &str, capacity: u32) -> Self {
        Self {
            storage: LineStorage::new(
                device,
                label,
                capacity,
                sizes::LINE_HEADER,
                sizes::INDEX,
                wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::INDEX
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
            ),
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.storage.buffer
    }

    pub fn capacity(&self) -> u32 {
        self.storage.capacity
    }

    /// Index data past the header, for `set_index_buffer`
    pub fn index_slice(&self) -> wgpu::BufferSlice<'_> {
        self.storage.buffer.slice(sizes::LINE_HEADER..)
    }

    pub fn reset(&self, encoder: &mut wgpu::CommandEncoder, zero: &ZeroSource) {
        zero.zero(encoder, &self.storage.buffer, 0, sizes::LINE_HEADER);
    }

    pub fn resize(&mut self, device: &wgpu::Device, capacity: u32) -> bool {
        self.storage.resize(device, capacity)
    }
}

/// `(start, end)` view over an append line, computed on the GPU
pub struct ClusterWindow {
    args: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl ClusterWindow {
    /// Window over `line`; recreate it whenever `line` is reallocated
    pub fn new(device: &wgpu::Device, math: &BufferMath, label: &str, line: &wgpu::Buffer) -> Self {
        let args = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: sizes::WINDOW_ARGS,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let bind_group = math.bind(device, label, line, &args);
        Self { args, bind_group }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.args
    }

    /// Byte offset of the indirect dispatch arguments
    pub fn dispatch_offset(&self) -> u64 {
        WindowArgs::DISPATCH_OFFSET
    }

    pub fn reset(&self, encoder: &mut wgpu::CommandEncoder, zero: &ZeroSource) {
        zero.zero(encoder, &self.args, 0, sizes::WINDOW_ARGS);
    }

    /// Snapshot the line counter before a pass appends into it
    pub fn capture_start(&self, encoder: &mut wgpu::CommandEncoder, math: &BufferMath) {
        math.begin(encoder, &self.bind_group);
    }

    /// Close the window at the current counter and size its dispatch
    pub fn capture_end(&self, encoder: &mut wgpu::CommandEncoder, math: &BufferMath) {
        math.end(encoder, &self.bind_group);
    }

    /// Window over every record in the line
    pub fn capture_full(&self, encoder: &mut wgpu::CommandEncoder, math: &BufferMath) {
        math.full(encoder, &self.bind_group);
    }
}

/// Indirect draw arguments for one stream plus the index window they cover
pub struct DrawDataLine {
    storage: LineStorage,
    index_window: ClusterWindow,
}

impl DrawDataLine {
    /// Draw line whose index window views `index_line`
    pub fn new(
        device: &wgpu::Device,
        math: &BufferMath,
        label: &str,
        capacity: u32,
        index_line: &IndexDataLine,
    ) -> Self {
        let storage = LineStorage::new(
            device,
            label,
            capacity,
            sizes::DRAW_LINE_HEADER,
            sizes::DRAW_COMMAND,
            wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        );
        let index_window = ClusterWindow::new(
            device,
            math,
            &format!("{} Index Window", label),
            index_line.buffer(),
        );
        Self {
            storage,
            index_window,
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.storage.buffer
    }

    pub fn capacity(&self) -> u32 {
        self.storage.capacity
    }

    pub fn index_window(&self) -> &ClusterWindow {
        &self.index_window
    }

    pub fn count_offset(&self) -> u64 {
        DrawLineHeader::COUNT_OFFSET
    }

    pub fn summary_offset(&self) -> u64 {
        DrawLineHeader::SUMMARY_OFFSET
    }

    pub fn args_offset(&self) -> u64 {
        DrawLineHeader::ARGS_OFFSET
    }

    /// Recreate storage for `capacity` draws and rebuild the index window over
    /// `index_line`, which may itself have been reallocated
    pub fn resize(
        &mut self,
        device: &wgpu::Device,
        math: &BufferMath,
        capacity: u32,
        index_line: &IndexDataLine,
    ) -> bool {
        let resized = self.storage.resize(device, capacity);
        self.index_window = ClusterWindow::new(
            device,
            math,
            &format!("{} Index Window", self.storage.label),
            index_line.buffer(),
        );
        resized
    }

    /// Zero the draw count, summary draw and index window
    pub fn reset(&self, encoder: &mut wgpu::CommandEncoder, zero: &ZeroSource) {
        zero.zero(encoder, &self.storage.buffer, 0, sizes::DRAW_LINE_HEADER);
        self.index_window.reset(encoder, zero);
    }

    /// Record the draws for this line.
    ///
    /// With multi-draw-indirect-count every cluster is its own draw; otherwise
    /// a single summary draw covers the line's contiguous index window.
    pub fn draw<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>, multi_draw: bool) {
        if multi_draw {
            pass.multi_draw_indexed_indirect_count(
                &self.storage.buffer,
                self.args_offset(),
                &self.storage.buffer,
                self.count_offset(),
                self.capacity(),
            );
        } else {
            pass.draw_indexed_indirect(&self.storage.buffer, self.summary_offset());
        }
    }
}
