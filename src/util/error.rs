//! Error types for the path tracing driver.

use thiserror::Error;

use crate::device::DeviceKernel;

/// Main error type for render setup and execution.
#[derive(Error, Debug)]
pub enum Error {
    /// A device exposed no integrator queues at all
    #[error("Device '{device}' provides no integrator queues")]
    NoIntegratorQueues { device: String },

    /// Device refused to create an integrator queue
    #[error("Failed to create integrator queue on '{device}': {reason}")]
    QueueCreation { device: String, reason: String },

    /// Buffer parameters do not describe a usable frame
    #[error("Invalid buffer parameters: {0}")]
    InvalidBufferParams(String),

    /// Work tile does not fit into the bound render buffers
    #[error("Work tile {x},{y} {width}x{height} is outside of the render buffer")]
    TileOutOfBounds { x: i32, y: i32, width: u32, height: u32 },

    /// Kernel execution failed on a device queue
    #[error("Kernel {kernel} failed: {reason}")]
    KernelFailed { kernel: DeviceKernel, reason: String },

    /// Dedicated worker pool could not be created
    #[error("Failed to create thread pool: {0}")]
    ThreadPool(String),

    /// Render settings are invalid
    #[error("Invalid settings: {0}")]
    Settings(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an invalid buffer parameters error.
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidBufferParams(msg.into())
    }

    /// Create a kernel failure for the given stage.
    pub fn kernel(kernel: DeviceKernel, reason: impl Into<String>) -> Self {
        Self::KernelFailed { kernel, reason: reason.into() }
    }
}

/// Result type alias for path tracing operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::NoIntegratorQueues { device: "CPU".into() };
        assert!(e.to_string().contains("CPU"));

        let e = Error::kernel(DeviceKernel::Subsurface, "out of memory");
        let msg = e.to_string();
        assert!(msg.contains("SUBSURFACE"));
        assert!(msg.contains("out of memory"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
