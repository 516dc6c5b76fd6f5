//! Frame orchestration, render targets and the GPU backend

pub mod depth_pyramid;
pub mod draw;
pub mod model_renderer;
pub mod picker;
pub mod resources;
pub mod schedule;
pub mod shadow_renderer;
pub mod statistics;
pub mod target;

pub use depth_pyramid::DepthPyramid;
pub use draw::{ClusterDrawer, DrawKind};
pub use model_renderer::{GpuPasses, ModelRenderer};
pub use picker::Picker;
pub use resources::{LineCapacity, ModelResources};
pub use schedule::{Phase, TwoPhaseSchedule, VisibilityPasses};
pub use shadow_renderer::{LightCache, ShadowLayout, ShadowRenderer, ShadowView, NO_SHADOW_LAYER};
pub use statistics::{FrameCounters, FrameStatistics, PhaseStatistics};
pub use target::RenderTarget;
