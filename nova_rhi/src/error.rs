//! Error types for the Nova render hardware interface
//!
//! This module defines the error types used throughout the backend,
//! including device calls, resource management and frame lifecycle.

use std::fmt;

/// Result type for Nova RHI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Nova RHI errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (device call failed, precondition not met, etc.)
    BackendError(String),

    /// Out of GPU memory, or no memory type matches the request
    OutOfMemory,

    /// Invalid resource (stale handle, unknown uniform, unset binding, etc.)
    InvalidResource(String),

    /// Initialization failed (instance, device, swapchain, window state)
    InitializationFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
