//! Renderer configuration
//!
//! Loaded from TOML. Every field has a default so a partial file (or none at
//! all) is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// Largest record count a cluster line can address.
///
/// Expanded index values pack the record slot into the upper 24 bits.
pub const MAX_CLUSTER_LINE_CAPACITY: u32 = 1 << 24;

/// What happens when an append would exceed a data line's capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnOverflow {
    /// Drop the record and hold the counter at capacity
    #[default]
    Saturate,
    /// Drop the record, then halt at the next statistics readback
    Assert,
}

/// Tunables for the visibility pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Cluster line capacity as a multiple of the scene's cluster count
    pub capacity_multiplier: u32,

    /// Lower bound on cluster line capacity (keeps empty scenes allocatable)
    pub min_cluster_capacity: u32,

    /// Index line capacity as a multiple of the scene's total index count
    pub index_capacity_multiplier: u32,

    /// Overflow policy for every data line
    pub overflow: OnOverflow,

    /// Index cap per cluster for mesh streams
    pub default_cluster_size: u32,

    /// Index cap per cluster for terrain streams
    pub terrain_cluster_size: u32,

    /// Shadow map resolution (square)
    pub shadow_map_size: u32,

    /// Upper bound on shadow views (spot = 1, point = 6)
    pub max_shadow_views: u32,

    /// Upload ring size in bytes
    pub upload_ring_size: u64,

    /// Use multi-draw-indirect-count when the device supports it
    pub prefer_multi_draw: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            capacity_multiplier: 10,
            min_cluster_capacity: 1024,
            index_capacity_multiplier: 2,
            overflow: OnOverflow::Saturate,
            default_cluster_size: 192,
            terrain_cluster_size: 600,
            shadow_map_size: 1024,
            max_shadow_views: 24,
            upload_ring_size: 16 * 1024 * 1024,
            prefer_multi_draw: true,
        }
    }
}

impl RenderConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> RenderResult<Self> {
        let config: RenderConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|error| RenderError::ConfigIo {
            path: path.display().to_string(),
            error,
        })?;

        let config = Self::from_toml_str(&source)?;
        log::info!(
            "[RenderConfig::from_file] Loaded {} (overflow policy {:?})",
            path.display(),
            config.overflow
        );
        Ok(config)
    }

    pub fn to_toml_string(&self) -> RenderResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check ranges the pipeline relies on
    pub fn validate(&self) -> RenderResult<()> {
        if self.capacity_multiplier == 0 {
            return Err(RenderError::InvalidConfig {
                field: "capacity_multiplier",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.index_capacity_multiplier == 0 {
            return Err(RenderError::InvalidConfig {
                field: "index_capacity_multiplier",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.min_cluster_capacity == 0 || self.min_cluster_capacity > MAX_CLUSTER_LINE_CAPACITY {
            return Err(RenderError::InvalidConfig {
                field: "min_cluster_capacity",
                reason: format!("must be in 1..={}", MAX_CLUSTER_LINE_CAPACITY),
            });
        }
        for (field, size) in [
            ("default_cluster_size", self.default_cluster_size),
            ("terrain_cluster_size", self.terrain_cluster_size),
        ] {
            if size < 3 || size % 3 != 0 {
                return Err(RenderError::InvalidConfig {
                    field,
                    reason: format!("{} is not a positive multiple of 3", size),
                });
            }
        }
        if !self.shadow_map_size.is_power_of_two() {
            return Err(RenderError::InvalidConfig {
                field: "shadow_map_size",
                reason: format!("{} is not a power of two", self.shadow_map_size),
            });
        }
        if self.max_shadow_views == 0 {
            return Err(RenderError::InvalidConfig {
                field: "max_shadow_views",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.upload_ring_size < 4096 {
            return Err(RenderError::InvalidConfig {
                field: "upload_ring_size",
                reason: "must be at least 4096 bytes".to_string(),
            });
        }
        Ok(())
    }

    /// Cluster line capacity for a scene with `cluster_count` instance clusters
    pub fn cluster_capacity(&self, cluster_count: u32) -> RenderResult<u32> {
        let requested = (cluster_count as u64 * self.capacity_multiplier as u64)
            .max(self.min_cluster_capacity as u64);
        if requested > MAX_CLUSTER_LINE_CAPACITY as u64 {
            return Err(RenderError::CapacityLimit {
                line: "cluster line",
                requested,
                limit: MAX_CLUSTER_LINE_CAPACITY as u64,
            });
        }
        Ok(requested as u32)
    }

    /// Index line capacity for a scene whose instances reference `index_count` indices
    pub fn index_capacity(&self, index_count: u64) -> RenderResult<u32> {
        let requested = (index_count * self.index_capacity_multiplier as u64)
            .max(self.min_cluster_capacity as u64 * self.default_cluster_size as u64);
        if requested > u32::MAX as u64 / 4 {
            return Err(RenderError::CapacityLimit {
                line: "index line",
                requested,
                limit: u32::MAX as u64 / 4,
            });
        }
        Ok(requested as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = RenderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capacity_multiplier, 10);
        assert_eq!(config.terrain_cluster_size, 600);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RenderConfig::from_toml_str("overflow = \"assert\"\ncapacity_multiplier = 4\n")
            .expect("valid config");
        assert_eq!(config.overflow, OnOverflow::Assert);
        assert_eq!(config.capacity_multiplier, 4);
        assert_eq!(config.shadow_map_size, 1024);
    }

    #[test]
    fn test_rejects_bad_cluster_size() {
        let err = RenderConfig::from_toml_str("terrain_cluster_size = 601\n").unwrap_err();
        assert!(matches!(
            err,
            RenderError::InvalidConfig { field: "terrain_cluster_size", .. }
        ));
    }

    #[test]
    fn test_rejects_unknown_overflow_policy() {
        assert!(RenderConfig::from_toml_str("overflow = \"wrap\"\n").is_err());
    }

    #[test]
    fn test_cluster_capacity_limits() {
        let config = RenderConfig::default();
        assert_eq!(config.cluster_capacity(0).unwrap(), config.min_cluster_capacity);
        assert_eq!(config.cluster_capacity(1000).unwrap(), 10_000);
        assert!(config.cluster_capacity(MAX_CLUSTER_LINE_CAPACITY).is_err());
    }

    #[test]
    fn test_round_trip_through_file() {
        let config = RenderConfig {
            overflow: OnOverflow::Assert,
            max_shadow_views: 12,
            ..Default::default()
        };

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(config.to_toml_string().unwrap().as_bytes())
            .expect("write config");

        let loaded = RenderConfig::from_file(file.path()).expect("load config");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = RenderConfig::from_file("/nonexistent/cluster.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cluster.toml"));
    }
}
