//! CUDA backend for the active-device register.
//!
//! Talks to the CUDA runtime API directly. The register behind
//! `cudaGetDevice`/`cudaSetDevice` is per-thread, so guards on different
//! threads are independent.

use std::ffi::CStr;
use std::os::raw::c_int;

use crate::error::{Result, RuntimeDeviceError};
use crate::runtime::DeviceRuntime;

mod ffi {
    use std::os::raw::{c_char, c_int};

    #[link(name = "cudart")]
    extern "C" {
        pub fn cudaGetDevice(device: *mut c_int) -> c_int;
        pub fn cudaSetDevice(device: c_int) -> c_int;
        pub fn cudaGetDeviceCount(count: *mut c_int) -> c_int;
        pub fn cudaGetErrorString(error: c_int) -> *const c_char;
    }
}

fn cuda_check(status: c_int) -> Result<()> {
    if status == 0 {
        return Ok(());
    }
    let message = unsafe {
        let ptr = ffi::cudaGetErrorString(status);
        if ptr.is_null() {
            "unknown CUDA error".to_string()
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    };
    Err(RuntimeDeviceError::new(status, message))
}

/// Active-device register backed by the CUDA runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct CudaRuntime;

impl CudaRuntime {
    pub fn new() -> Self {
        Self
    }

    /// True when at least one CUDA device is visible to this process.
    pub fn is_available() -> bool {
        Self::device_count().map(|count| count > 0).unwrap_or(false)
    }

    /// Number of visible CUDA devices, respecting `CUDA_VISIBLE_DEVICES`.
    pub fn device_count() -> Result<i32> {
        let mut count: c_int = 0;
        cuda_check(unsafe { ffi::cudaGetDeviceCount(&mut count) })?;

        if let Ok(visible) = std::env::var("CUDA_VISIBLE_DEVICES") {
            if !visible.is_empty() && visible != "-1" {
                let visible_count = visible.split(',').count() as i32;
                count = count.min(visible_count);
            }
        }
        Ok(count)
    }
}

impl DeviceRuntime for CudaRuntime {
    fn current_device(&self) -> Result<i32> {
        let mut device: c_int = -1;
        cuda_check(unsafe { ffi::cudaGetDevice(&mut device) })?;
        Ok(device)
    }

    fn set_device(&self, device: i32) -> Result<()> {
        cuda_check(unsafe { ffi::cudaSetDevice(device) })
    }
}
