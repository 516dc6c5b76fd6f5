//! Cluster categories and per-category tables

use serde::{Deserialize, Serialize};

use crate::config::RenderConfig;

/// Material category a cluster is drawn with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterCategory {
    Opaque = 0,
    AlphaClipped = 1,
    Transparent = 2,
    Terrain = 3,
}

impl ClusterCategory {
    pub const ALL: [ClusterCategory; 4] = [
        ClusterCategory::Opaque,
        ClusterCategory::AlphaClipped,
        ClusterCategory::Transparent,
        ClusterCategory::Terrain,
    ];

    /// Streams that write depth, in draw order
    pub const DEPTH_WRITING: [ClusterCategory; 3] = [
        ClusterCategory::AlphaClipped,
        ClusterCategory::Opaque,
        ClusterCategory::Terrain,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn bit(self) -> u32 {
        1 << self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            ClusterCategory::Opaque => "opaque",
            ClusterCategory::AlphaClipped => "alpha-clipped",
            ClusterCategory::Transparent => "transparent",
            ClusterCategory::Terrain => "terrain",
        }
    }

    /// Contributes to the depth buffer and therefore to the depth pyramid
    pub fn writes_depth(self) -> bool {
        !matches!(self, ClusterCategory::Transparent)
    }

    /// Drawn in a depth-only pass before shading
    pub fn depth_prepass(self) -> bool {
        matches!(self, ClusterCategory::AlphaClipped)
    }

    pub fn casts_shadow(self) -> bool {
        self.writes_depth()
    }

    /// Index cap per cluster used by index expansion
    pub fn cluster_size_hint(self, config: &RenderConfig) -> u32 {
        match self {
            ClusterCategory::Terrain => config.terrain_cluster_size,
            _ => config.default_cluster_size,
        }
    }

    /// Mask admitting every shadow-casting category
    pub fn shadow_mask() -> u32 {
        Self::ALL
            .iter()
            .filter(|c| c.casts_shadow())
            .fold(0, |mask, c| mask | c.bit())
    }
}

/// One value per category, indexable by [`ClusterCategory`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerCategory<T> {
    values: [T; 4],
}

impl<T> PerCategory<T> {
    pub fn from_fn(mut f: impl FnMut(ClusterCategory) -> T) -> Self {
        Self {
            values: ClusterCategory::ALL.map(&mut f),
        }
    }

    pub fn get(&self, category: ClusterCategory) -> &T {
        &self.values[category.index()]
    }

    pub fn get_mut(&mut self, category: ClusterCategory) -> &mut T {
        &mut self.values[category.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClusterCategory, &T)> {
        ClusterCategory::ALL.into_iter().zip(self.values.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ClusterCategory, &mut T)> {
        ClusterCategory::ALL.into_iter().zip(self.values.iter_mut())
    }

    pub fn map<U>(&self, mut f: impl FnMut(ClusterCategory, &T) -> U) -> PerCategory<U> {
        PerCategory::from_fn(|c| f(c, self.get(c)))
    }
}

impl<T> std::ops::Index<ClusterCategory> for PerCategory<T> {
    type Output = T;

    fn index(&self, category: ClusterCategory) -> &T {
        self.get(category)
    }
}

impl<T> std::ops::IndexMut<ClusterCategory> for PerCategory<T> {
    fn index_mut(&mut self, category: ClusterCategory) -> &mut T {
        self.get_mut(category)
    }
}
