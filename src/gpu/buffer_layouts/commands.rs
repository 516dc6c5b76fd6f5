//! Indirect command and data line header layouts
//!
//! Every struct here is read or written by WGSL; field order and padding must
//! match the shader declarations exactly.

use bytemuck::{Pod, Zeroable};

/// Default `max_compute_workgroups_per_dimension`
pub const MAX_GROUPS_PER_DIMENSION: u32 = 65535;

/// Matches wgpu's DrawIndexedIndirect layout exactly
/// Total size: 20 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectDrawIndexedCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

impl IndirectDrawIndexedCommand {
    /// Draw that renders nothing
    pub const EMPTY: Self = Self {
        index_count: 0,
        instance_count: 1,
        first_index: 0,
        base_vertex: 0,
        first_instance: 0,
    };

    /// Single-instance draw over `index_count` indices starting at `first_index`
    pub fn range(first_index: u32, index_count: u32) -> Self {
        Self {
            index_count,
            instance_count: 1,
            first_index,
            base_vertex: 0,
            first_instance: 0,
        }
    }
}

/// Matches wgpu's DispatchIndirect layout
/// Total size: 12 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DispatchIndirectCommand {
    pub workgroups_x: u32,
    pub workgroups_y: u32,
    pub workgroups_z: u32,
}

impl DispatchIndirectCommand {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self {
            workgroups_x: x,
            workgroups_y: y,
            workgroups_z: z,
        }
    }

    /// Workgroups needed for `items` threads at `group_size` threads per group.
    /// Splits into rows when a single dimension would exceed the device limit.
    pub fn for_items(items: u32, group_size: u32) -> Self {
        Self::for_groups(items.div_ceil(group_size))
    }

    /// Lay out `groups` workgroups as `x * y >= groups` with `x <= MAX_GROUPS_PER_DIMENSION`
    pub fn for_groups(groups: u32) -> Self {
        let rows = groups.div_ceil(MAX_GROUPS_PER_DIMENSION).max(1);
        Self::new(groups.div_ceil(rows), rows, 1)
    }
}

/// Header at the start of every cluster and index line buffer
/// Total size: 16 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct LineHeader {
    /// Records written (never above capacity)
    pub count: u32,
    /// Non-zero once an append was dropped
    pub overflow: u32,
    pub _padding: [u32; 2],
}

/// A `(start, end)` view over an append line plus dispatch arguments sized
/// to the view's record count
/// Total size: 32 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WindowArgs {
    pub start: u32,
    pub end: u32,
    pub count: u32,
    pub dispatch: DispatchIndirectCommand,
    pub _padding: [u32; 2],
}

impl WindowArgs {
    /// Byte offset of the dispatch arguments inside the window buffer
    pub const DISPATCH_OFFSET: u64 = 12;

    /// Window over `[start, end)` with one thread per record
    pub fn span(start: u32, end: u32, group_size: u32) -> Self {
        let count = end.saturating_sub(start);
        Self {
            start,
            end,
            count,
            dispatch: DispatchIndirectCommand::for_items(count, group_size),
            _padding: [0; 2],
        }
    }
}

/// Header of a draw line: draw count, overflow flag and the summary draw
/// covering the whole index window
/// Total size: 48 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawLineHeader {
    pub count: u32,
    pub overflow: u32,
    pub _padding0: [u32; 2],
    pub summary: IndirectDrawIndexedCommand,
    pub _padding1: [u32; 3],
}

impl DrawLineHeader {
    /// Byte offset of the draw count (multi-draw count buffer offset)
    pub const COUNT_OFFSET: u64 = 0;
    /// Byte offset of the summary draw
    pub const SUMMARY_OFFSET: u64 = 16;
    /// Byte offset of the first per-cluster draw
    pub const ARGS_OFFSET: u64 = 48;
}

/// Header of the instance cull output
/// Total size: 16 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct InstanceCullHeader {
    pub accepted_count: u32,
    /// Running total of clusters owned by accepted instances
    pub cluster_allocation: u32,
    pub overflow: u32,
    pub _padding: u32,
}

/// One accepted instance and its slice of the candidate line
/// Total size: 16 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct AcceptedInstance {
    pub instance_id: u32,
    pub cluster_base: u32,
    pub cluster_count: u32,
    pub _padding: u32,
}
