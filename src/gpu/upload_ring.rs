//! Upload ring
//!
//! Scene data reaches the GPU through one fixed-size staging buffer. Each
//! upload reserves a region tagged with the submission it belongs to; regions
//! are reclaimed once the queue reports that submission complete. Running out
//! of space is the only CPU blocking point of a frame.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{RenderError, RenderResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    submission: u64,
    offset: u64,
    end: u64,
}

/// Ring allocation bookkeeping, independent of any device
#[derive(Debug)]
pub struct RingAllocator {
    capacity: u64,
    head: u64,
    regions: VecDeque<Region>,
}

impl RingAllocator {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            head: 0,
            regions: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn live_regions(&self) -> usize {
        self.regions.len()
    }

    /// Reserve `size` bytes (rounded up to the copy alignment) for `submission`
    pub fn allocate(&mut self, size: u64, submission: u64) -> Option<u64> {
        let size = align_to(size, wgpu::COPY_BUFFER_ALIGNMENT);
        if size == 0 {
            return Some(self.head);
        }
        if size > self.capacity {
            return None;
        }

        let offset = match self.regions.front() {
            None => {
                self.head = 0;
                0
            }
            Some(oldest) => {
                let tail = oldest.offset;
                if self.head > tail {
                    if self.capacity - self.head >= size {
                        self.head
                    } else if tail >= size {
                        0
                    } else {
                        return None;
                    }
                } else if tail - self.head >= size {
                    self.head
                } else {
                    return None;
                }
            }
        };

        self.head = offset + size;
        self.regions.push_back(Region {
            submission,
            offset,
            end: self.head,
        });
        Some(offset)
    }

    /// Free every region whose submission has completed
    pub fn reclaim(&mut self, completed: u64) {
        while let Some(region) = self.regions.front() {
            if region.submission > completed {
                break;
            }
            self.regions.pop_front();
        }
        if self.regions.is_empty() {
            self.head = 0;
        }
    }
}

fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Staging ring feeding `copy_buffer_to_buffer` uploads
pub struct UploadRing {
    buffer: wgpu::Buffer,
    allocator: RingAllocator,
    submission: u64,
    completed: Arc<AtomicU64>,
}

impl UploadRing {
    pub fn new(device: &wgpu::Device, capacity: u64) -> Self {
        let capacity = align_to(capacity.max(wgpu::COPY_BUFFER_ALIGNMENT), wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Upload Ring"),
            size: capacity,
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        log::debug!("[UploadRing::new] {} bytes", capacity);

        Self {
            buffer,
            allocator: RingAllocator::new(capacity),
            submission: 1,
            completed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Stage `data` and record a copy into `destination` at `destination_offset`
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        data: &[u8],
        destination: &wgpu::Buffer,
        destination_offset: u64,
    ) -> RenderResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let offset = self.reserve(device, data.len() as u64)?;
        queue.write_buffer(&self.buffer, offset, data);
        encoder.copy_buffer_to_buffer(
            &self.buffer,
            offset,
            destination,
            destination_offset,
            align_to(data.len() as u64, wgpu::COPY_BUFFER_ALIGNMENT),
        );
        Ok(())
    }

    fn reserve(&mut self, device: &wgpu::Device, size: u64) -> RenderResult<u64> {
        self.allocator.reclaim(self.completed.load(Ordering::Acquire));
        if let Some(offset) = self.allocator.allocate(size, self.submission) {
            return Ok(offset);
        }

        log::warn!(
            "[UploadRing::reserve] No space for {} bytes ({} regions in flight), waiting for GPU",
            size,
            self.allocator.live_regions()
        );
        device.poll(wgpu::Maintain::Wait);
        self.allocator.reclaim(self.completed.load(Ordering::Acquire));

        self.allocator
            .allocate(size, self.submission)
            .ok_or(RenderError::UploadExhausted {
                requested: size,
                capacity: self.allocator.capacity(),
            })
    }

    /// Close the current submission; call right after `queue.submit`
    pub fn finish_submission(&mut self, queue: &wgpu::Queue) {
        let submission = self.submission;
        let completed = Arc::clone(&self.completed);
        queue.on_submitted_work_done(move || {
            completed.fetch_max(submission, Ordering::AcqRel);
        });
        self.submission += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocations_are_aligned_and_disjoint() {
        let mut ring = RingAllocator::new(64);
        let a = ring.allocate(5, 1).unwrap();
        let b = ring.allocate(8, 1).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 8);
    }

    #[test]
    fn test_full_ring_fails_until_reclaimed() {
        let mut ring = RingAllocator::new(32);
        assert!(ring.allocate(32, 1).is_some());
        assert!(ring.allocate(4, 2).is_none());
        ring.reclaim(1);
        assert_eq!(ring.allocate(4, 2), Some(0));
    }

    #[test]
    fn test_wraps_around_to_front() {
        let mut ring = RingAllocator::new(32);
        ring.allocate(16, 1).unwrap();
        ring.allocate(12, 2).unwrap();
        ring.reclaim(1);
        // 4 bytes left at the end, 16 free at the front
        assert_eq!(ring.allocate(8, 3), Some(0));
        assert!(ring.allocate(12, 3).is_none());
        assert_eq!(ring.allocate(8, 3), Some(8));
    }

    #[test]
    fn test_oversized_request_is_rejected() {
        let mut ring = RingAllocator::new(16);
        assert!(ring.allocate(20, 1).is_none());
    }
}
