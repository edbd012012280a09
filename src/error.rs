//! Error type shared by the runtime backends and the scope guard.

/// Status code the CUDA runtime reports for an out-of-range device index.
pub const STATUS_INVALID_DEVICE: i32 = 101;

/// Error reported when the accelerator runtime returns a non-success status
/// from a device query or a device switch.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("accelerator runtime error ({code}): {message}")]
pub struct RuntimeDeviceError {
    /// Numeric status code as reported by the runtime.
    pub code: i32,
    /// Human-readable description from the runtime.
    pub message: String,
}

impl RuntimeDeviceError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_device(device: i32) -> Self {
        Self::new(
            STATUS_INVALID_DEVICE,
            format!("invalid device ordinal: {}", device),
        )
    }
}

pub type Result<T> = std::result::Result<T, RuntimeDeviceError>;
