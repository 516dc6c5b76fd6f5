//! Error types for setup, configuration and readback.
//!
//! Culling and expansion record GPU commands only and have no error channel.
//! Everything that can fail on the CPU side (device creation, configuration,
//! buffer mapping, upload staging) reports through [`RenderError`].

use thiserror::Error;

/// Errors surfaced by the rendering core
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("No suitable GPU adapter found")]
    AdapterNotFound,

    #[error("Adapter '{name}' cannot run the pipeline: {reason}")]
    UnsupportedAdapter { name: String, reason: String },

    #[error("GPU device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("Failed to read config file {path}: {error}")]
    ConfigIo {
        path: String,
        error: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Capacity {requested} for {line} exceeds the limit of {limit}")]
    CapacityLimit {
        line: &'static str,
        requested: u64,
        limit: u64,
    },

    #[error("Failed to map GPU buffer '{buffer}': {error}")]
    BufferMapping { buffer: String, error: String },

    #[error("Upload ring exhausted: requested {requested} bytes, capacity {capacity} bytes")]
    UploadExhausted { requested: u64, capacity: u64 },

    #[error("Scene references unknown mesh {0}")]
    UnknownMesh(u32),

    #[error("{component}: {error}")]
    System { component: String, error: String },
}

/// Result alias used across the crate
pub type RenderResult<T> = Result<T, RenderError>;

/// Attaches a component context to foreign errors
pub trait RenderErrorContext<T> {
    fn render_context(self, context: &str) -> RenderResult<T>;
}

impl<T, E> RenderErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn render_context(self, context: &str) -> RenderResult<T> {
        self.map_err(|e| RenderError::System {
            component: context.to_string(),
            error: e.to_string(),
        })
    }
}

/// Create a buffer mapping error
pub fn buffer_mapping_error(buffer: &str, error: impl std::fmt::Display) -> RenderError {
    RenderError::BufferMapping {
        buffer: buffer.to_string(),
        error: error.to_string(),
    }
}
