//! Two-phase frame schedule
//!
//! The order of passes in one frame, independent of who executes them. The
//! GPU backend records each step into a command encoder; the CPU reference
//! pipeline runs each step immediately. Both see exactly the same sequence.

use crate::culling::{ClusterCategory, FrameSlots, RingCursor, RING_DEPTH};

/// Render phase within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Last frame's visible set, re-tested against the current frustum
    First,
    /// Clusters newly revealed by occlusion culling against Phase-1 depth
    Second,
}

impl Phase {
    pub const ALL: [Phase; 2] = [Phase::First, Phase::Second];

    pub fn index(self) -> usize {
        match self {
            Phase::First => 0,
            Phase::Second => 1,
        }
    }
}

/// One backend's implementation of every step of a frame
pub trait VisibilityPasses {
    /// Reset every line of the current slot and the shared per-frame lines
    fn reset_lines(&mut self, slots: FrameSlots);

    /// Clear depth, color and pick targets
    fn clear_targets(&mut self);

    /// Frustum-cull the previous slot's visible line into the Phase-1 category lines
    fn cull_seed_clusters(&mut self, slots: FrameSlots);

    /// Expand one category stream of `phase` into indices and draw it
    fn expand_and_draw(&mut self, slots: FrameSlots, phase: Phase, category: ClusterCategory);

    /// Rebuild the depth pyramid from the depth written so far
    fn build_depth_pyramid(&mut self);

    /// Frustum and Hi-Z cull every instance
    fn cull_instances(&mut self, slots: FrameSlots);

    /// Expand accepted instances into candidate clusters
    fn expand_candidates(&mut self, slots: FrameSlots);

    /// Occlusion-cull candidates into the visible line and the Phase-2 category lines
    fn cull_occlusion(&mut self, slots: FrameSlots);

    /// Snapshot the counters of `phase`
    fn record_statistics(&mut self, slots: FrameSlots, phase: Phase);
}

/// Drives a [`VisibilityPasses`] backend through the frame ring
#[derive(Debug, Default)]
pub struct TwoPhaseSchedule {
    cursor: RingCursor<RING_DEPTH>,
}

impl TwoPhaseSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots the next frame will use
    pub fn slots(&self) -> FrameSlots {
        self.cursor.slots()
    }

    /// Run one frame and advance the ring. Returns the slots the frame used.
    pub fn record_frame(&mut self, passes: &mut impl VisibilityPasses) -> FrameSlots {
        let slots = self.cursor.slots();

        passes.reset_lines(slots);
        passes.clear_targets();

        // Phase 1
        passes.cull_seed_clusters(slots);
        for category in ClusterCategory::DEPTH_WRITING {
            passes.expand_and_draw(slots, Phase::First, category);
        }

        passes.build_depth_pyramid();

        // Phase 2
        passes.cull_instances(slots);
        passes.expand_candidates(slots);
        passes.cull_occlusion(slots);
        for category in ClusterCategory::DEPTH_WRITING {
            passes.expand_and_draw(slots, Phase::Second, category);
        }

        // Transparent streams of both phases, no depth writes
        passes.expand_and_draw(slots, Phase::First, ClusterCategory::Transparent);
        passes.expand_and_draw(slots, Phase::Second, ClusterCategory::Transparent);

        // Both snapshots follow the last expansion of their phase
        passes.record_statistics(slots, Phase::First);
        passes.record_statistics(slots, Phase::Second);

        self.cursor.advance();
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Step {
        Reset(usize),
        Clear,
        Seed(usize, usize),
        Draw(Phase, ClusterCategory),
        Pyramid,
        Instances,
        Candidates,
        Occlusion,
        Stats(Phase),
    }

    #[derive(Default)]
    struct Recorder {
        steps: Vec<Step>,
    }

    impl VisibilityPasses for Recorder {
        fn reset_lines(&mut self, slots: FrameSlots) {
            self.steps.push(Step::Reset(slots.current));
        }
        fn clear_targets(&mut self) {
            self.steps.push(Step::Clear);
        }
        fn cull_seed_clusters(&mut self, slots: FrameSlots) {
            self.steps.push(Step::Seed(slots.previous, slots.current));
        }
        fn expand_and_draw(&mut self, _: FrameSlots, phase: Phase, category: ClusterCategory) {
            self.steps.push(Step::Draw(phase, category));
        }
        fn build_depth_pyramid(&mut self) {
            self.steps.push(Step::Pyramid);
        }
        fn cull_instances(&mut self, _: FrameSlots) {
            self.steps.push(Step::Instances);
        }
        fn expand_candidates(&mut self, _: FrameSlots) {
            self.steps.push(Step::Candidates);
        }
        fn cull_occlusion(&mut self, _: FrameSlots) {
            self.steps.push(Step::Occlusion);
        }
        fn record_statistics(&mut self, _: FrameSlots, phase: Phase) {
            self.steps.push(Step::Stats(phase));
        }
    }

    #[test]
    fn test_frame_order() {
        let mut schedule = TwoPhaseSchedule::new();
        let mut recorder = Recorder::default();
        schedule.record_frame(&mut recorder);

        use ClusterCategory::*;
        let expected = vec![
            Step::Reset(0),
            Step::Clear,
            Step::Seed(RING_DEPTH - 1, 0),
            Step::Draw(Phase::First, AlphaClipped),
            Step::Draw(Phase::First, Opaque),
            Step::Draw(Phase::First, Terrain),
            Step::Pyramid,
            Step::Instances,
            Step::Candidates,
            Step::Occlusion,
            Step::Draw(Phase::Second, AlphaClipped),
            Step::Draw(Phase::Second, Opaque),
            Step::Draw(Phase::Second, Terrain),
            Step::Draw(Phase::First, Transparent),
            Step::Draw(Phase::Second, Transparent),
            Step::Stats(Phase::First),
            Step::Stats(Phase::Second),
        ];
        assert_eq!(recorder.steps, expected);
    }

    #[test]
    fn test_statistics_follow_every_draw_of_their_phase() {
        let mut schedule = TwoPhaseSchedule::new();
        let mut recorder = Recorder::default();
        schedule.record_frame(&mut recorder);

        for phase in [Phase::First, Phase::Second] {
            let stats_at = recorder
                .steps
                .iter()
                .position(|s| *s == Step::Stats(phase))
                .expect("statistics step");
            let last_draw = recorder
                .steps
                .iter()
                .rposition(|s| matches!(s, Step::Draw(p, _) if *p == phase))
                .expect("draw step");
            assert!(stats_at > last_draw, "{phase:?} statistics taken before its last draw");
        }
        assert_eq!(recorder.steps.last(), Some(&Step::Stats(Phase::Second)));
    }

    #[test]
    fn test_reset_precedes_every_write_of_a_slot() {
        let mut schedule = TwoPhaseSchedule::new();
        let mut recorder = Recorder::default();
        for _ in 0..RING_DEPTH * 2 + 3 {
            recorder.steps.clear();
            let slots = schedule.record_frame(&mut recorder);
            assert_eq!(recorder.steps[0], Step::Reset(slots.current));
            assert!(recorder
                .steps
                .iter()
                .skip(1)
                .all(|s| !matches!(s, Step::Reset(_))));
        }
    }

    #[test]
    fn test_seed_reads_the_slot_written_last_frame() {
        let mut schedule = TwoPhaseSchedule::new();
        let mut recorder = Recorder::default();
        let mut last = schedule.record_frame(&mut recorder);
        for _ in 0..RING_DEPTH + 1 {
            let slots = schedule.record_frame(&mut recorder);
            assert_eq!(slots.previous, last.current);
            assert_ne!(slots.current, last.current);
            last = slots;
        }
        assert_eq!(schedule.slots().current, (RING_DEPTH + 2) % RING_DEPTH);
    }
}
