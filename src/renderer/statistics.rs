//! Frame statistics
//!
//! Line counters are copied on the GPU into one [`FrameCounters`] block per
//! frame, which is read back once. Nothing in the hot path waits on it.

use bytemuck::{Pod, Zeroable};

use crate::config::OnOverflow;
use crate::culling::{ClusterCategory, PerCategory};

use super::schedule::Phase;

/// GPU-side counter block, filled by buffer copies
/// Total size: 144 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct FrameCounters {
    /// Window record count per phase and category
    pub phase_clusters: [[u32; 4]; 2],
    /// Draw count per phase and category
    pub phase_draws: [[u32; 4]; 2],
    /// Index window count per phase and category
    pub phase_indices: [[u32; 4]; 2],
    pub instances_accepted: u32,
    pub candidate_clusters: u32,
    pub occlusion_accepted: u32,
    pub index_count: u32,
    pub category_overflow: [u32; 4],
    pub visible_overflow: u32,
    pub candidate_overflow: u32,
    pub index_overflow: u32,
    pub instance_overflow: u32,
}

impl FrameCounters {
    pub const SIZE: u64 = std::mem::size_of::<FrameCounters>() as u64;

    pub const INSTANCES_ACCEPTED: u64 = 96;
    pub const CANDIDATE_CLUSTERS: u64 = 100;
    pub const OCCLUSION_ACCEPTED: u64 = 104;
    pub const INDEX_COUNT: u64 = 108;
    pub const VISIBLE_OVERFLOW: u64 = 128;
    pub const CANDIDATE_OVERFLOW: u64 = 132;
    pub const INDEX_OVERFLOW: u64 = 136;
    pub const INSTANCE_OVERFLOW: u64 = 140;

    pub fn phase_clusters_offset(phase: Phase, category: ClusterCategory) -> u64 {
        Self::cell(0, phase, category)
    }

    pub fn phase_draws_offset(phase: Phase, category: ClusterCategory) -> u64 {
        Self::cell(32, phase, category)
    }

    pub fn phase_indices_offset(phase: Phase, category: ClusterCategory) -> u64 {
        Self::cell(64, phase, category)
    }

    pub fn category_overflow_offset(category: ClusterCategory) -> u64 {
        112 + 4 * category.index() as u64
    }

    fn cell(base: u64, phase: Phase, category: ClusterCategory) -> u64 {
        base + 16 * phase.index() as u64 + 4 * category.index() as u64
    }
}

/// Counts for one phase
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseStatistics {
    pub clusters: PerCategory<u32>,
    pub draws: PerCategory<u32>,
    pub indices: PerCategory<u32>,
}

impl PhaseStatistics {
    pub fn total_clusters(&self) -> u32 {
        self.clusters.iter().map(|(_, v)| *v).sum()
    }

    pub fn total_draws(&self) -> u32 {
        self.draws.iter().map(|(_, v)| *v).sum()
    }

    pub fn total_indices(&self) -> u32 {
        self.indices.iter().map(|(_, v)| *v).sum()
    }

    pub fn triangles(&self) -> u32 {
        self.total_indices() / 3
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStatistics {
    pub phases: [PhaseStatistics; 2],
    pub instances_in: u32,
    pub instances_accepted: u32,
    pub candidate_clusters: u32,
    pub occlusion_accepted: u32,
    pub index_count: u32,
    pub category_overflow: PerCategory<bool>,
    pub visible_overflow: bool,
    pub candidate_overflow: bool,
    pub index_overflow: bool,
    pub instance_overflow: bool,
}

impl FrameStatistics {
    pub fn from_counters(counters: &FrameCounters, instances_in: u32) -> Self {
        let phase = |p: usize| PhaseStatistics {
            clusters: PerCategory::from_fn(|c| counters.phase_clusters[p][c.index()]),
            draws: PerCategory::from_fn(|c| counters.phase_draws[p][c.index()]),
            indices: PerCategory::from_fn(|c| counters.phase_indices[p][c.index()]),
        };

        Self {
            phases: [phase(0), phase(1)],
            instances_in,
            instances_accepted: counters.instances_accepted,
            candidate_clusters: counters.candidate_clusters,
            occlusion_accepted: counters.occlusion_accepted,
            index_count: counters.index_count,
            category_overflow: PerCategory::from_fn(|c| counters.category_overflow[c.index()] != 0),
            visible_overflow: counters.visible_overflow != 0,
            candidate_overflow: counters.candidate_overflow != 0,
            index_overflow: counters.index_overflow != 0,
            instance_overflow: counters.instance_overflow != 0,
        }
    }

    pub fn phase(&self, phase: Phase) -> &PhaseStatistics {
        &self.phases[phase.index()]
    }

    pub fn phase_mut(&mut self, phase: Phase) -> &mut PhaseStatistics {
        &mut self.phases[phase.index()]
    }

    /// Triangles drawn by both phases
    pub fn triangles(&self) -> u32 {
        self.phases.iter().map(PhaseStatistics::triangles).sum()
    }

    pub fn total_draws(&self) -> u32 {
        self.phases.iter().map(PhaseStatistics::total_draws).sum()
    }

    /// Names of every line that dropped records this frame
    pub fn overflowed_lines(&self) -> Vec<&'static str> {
        let mut lines: Vec<&'static str> = self
            .category_overflow
            .iter()
            .filter(|(_, flag)| **flag)
            .map(|(category, _)| category.name())
            .collect();
        for (flag, name) in [
            (self.visible_overflow, "visible"),
            (self.candidate_overflow, "candidates"),
            (self.index_overflow, "indices"),
            (self.instance_overflow, "instances"),
        ] {
            if flag {
                lines.push(name);
            }
        }
        lines
    }

    pub fn any_overflow(&self) -> bool {
        !self.overflowed_lines().is_empty()
    }

    /// Apply the overflow policy; panics under [`OnOverflow::Assert`]
    pub fn check_overflow(&self, policy: OnOverflow) {
        let lines = self.overflowed_lines();
        if lines.is_empty() {
            return;
        }
        match policy {
            OnOverflow::Saturate => {
                log::warn!("[FrameStatistics] Data lines saturated, records dropped: {:?}", lines);
            }
            OnOverflow::Assert => {
                log::error!("[FrameStatistics] Data line capacity exceeded: {:?}", lines);
                panic!("data line capacity exceeded: {:?}", lines);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn test_counter_layout() {
        assert_eq!(FrameCounters::SIZE, 144);
        assert_eq!(offset_of!(FrameCounters, instances_accepted) as u64, FrameCounters::INSTANCES_ACCEPTED);
        assert_eq!(offset_of!(FrameCounters, index_count) as u64, FrameCounters::INDEX_COUNT);
        assert_eq!(offset_of!(FrameCounters, visible_overflow) as u64, FrameCounters::VISIBLE_OVERFLOW);
        assert_eq!(offset_of!(FrameCounters, instance_overflow) as u64, FrameCounters::INSTANCE_OVERFLOW);
        assert_eq!(
            FrameCounters::category_overflow_offset(ClusterCategory::Opaque),
            offset_of!(FrameCounters, category_overflow) as u64
        );
        assert_eq!(
            FrameCounters::phase_indices_offset(Phase::Second, ClusterCategory::Terrain),
            offset_of!(FrameCounters, phase_indices) as u64 + 16 + 12
        );
    }

    #[test]
    fn test_offsets_land_in_the_right_cells() {
        let mut bytes = [0u8; 144];
        let offset = FrameCounters::phase_draws_offset(Phase::Second, ClusterCategory::AlphaClipped) as usize;
        bytes[offset..offset + 4].copy_from_slice(&7u32.to_ne_bytes());
        let counters: FrameCounters = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(counters.phase_draws[1][1], 7);
    }

    #[test]
    fn test_from_counters_and_totals() {
        let mut counters = FrameCounters::default();
        counters.phase_clusters[0] = [4, 1, 0, 2];
        counters.phase_indices[0] = [12, 3, 0, 6];
        counters.phase_indices[1] = [9, 0, 3, 0];
        counters.visible_overflow = 1;

        let stats = FrameStatistics::from_counters(&counters, 10);
        assert_eq!(stats.phase(Phase::First).total_clusters(), 7);
        assert_eq!(stats.phase(Phase::First).clusters[ClusterCategory::Terrain], 2);
        assert_eq!(stats.triangles(), 7 + 4);
        assert_eq!(stats.overflowed_lines(), vec!["visible"]);
    }

    #[test]
    fn test_saturate_policy_does_not_panic() {
        let mut stats = FrameStatistics::default();
        stats.index_overflow = true;
        stats.check_overflow(OnOverflow::Saturate);
    }

    #[test]
    #[should_panic(expected = "capacity exceeded")]
    fn test_assert_policy_panics() {
        let mut stats = FrameStatistics::default();
        *stats.category_overflow.get_mut(ClusterCategory::Opaque) = true;
        stats.check_overflow(OnOverflow::Assert);
    }

    #[test]
    fn test_clean_frame_passes_assert_policy() {
        FrameStatistics::default().check_overflow(OnOverflow::Assert);
    }
}
