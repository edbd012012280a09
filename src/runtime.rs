//! Backends for the accelerator's active-device register.
//!
//! The register itself is global mutable state owned by the accelerator
//! runtime. It is modeled here as an injectable capability so that the guard
//! can be driven deterministically in tests and degrades to a no-op when no
//! accelerator is present.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{Result, RuntimeDeviceError};

/// Sentinel device index meaning "no specific device requested".
pub const NO_DEVICE: i32 = -1;

/// The accelerator runtime's notion of "which device subsequent operations
/// target".
///
/// Whether the register is per-thread or process-wide is a property of the
/// backend (CUDA's is per-thread, [`InMemoryRuntime`]'s is process-wide).
/// Guards do not arbitrate concurrent access to a shared register.
pub trait DeviceRuntime: Send + Sync {
    /// Index of the currently active device.
    fn current_device(&self) -> Result<i32>;

    /// Make `device` the active device.
    fn set_device(&self, device: i32) -> Result<()>;
}

/// Register backend for builds or hosts without accelerator support.
///
/// Queries report [`NO_DEVICE`] and switches succeed without effect, so a
/// guard over this runtime never records an original device and stays in its
/// default sentinel state for its whole life.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRuntime;

impl DeviceRuntime for NoopRuntime {
    fn current_device(&self) -> Result<i32> {
        Ok(NO_DEVICE)
    }

    fn set_device(&self, _device: i32) -> Result<()> {
        Ok(())
    }
}

/// In-memory register tracking a single integer.
///
/// Intended for tests and CPU-only environments that still want observable
/// device-switch semantics. Counts query and switch calls and can be told to
/// fail either kind, which makes the guard's no-call and error paths
/// assertable.
pub struct InMemoryRuntime {
    active: AtomicI32,
    device_count: i32,
    queries: AtomicUsize,
    switches: AtomicUsize,
    fail_queries: AtomicBool,
    fail_switches: AtomicBool,
}

impl InMemoryRuntime {
    /// Register over `device_count` devices, starting on device 0.
    pub fn new(device_count: i32) -> Self {
        Self::with_active(device_count, 0)
    }

    /// Register over `device_count` devices, starting on `active`.
    pub fn with_active(device_count: i32, active: i32) -> Self {
        Self {
            active: AtomicI32::new(active),
            device_count,
            queries: AtomicUsize::new(0),
            switches: AtomicUsize::new(0),
            fail_queries: AtomicBool::new(false),
            fail_switches: AtomicBool::new(false),
        }
    }

    /// Currently active device, read without going through the counted
    /// query path.
    pub fn active(&self) -> i32 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn device_count(&self) -> i32 {
        self.device_count
    }

    /// Number of `current_device` calls made so far, failed ones included.
    pub fn query_calls(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of `set_device` calls made so far, failed ones included.
    pub fn switch_calls(&self) -> usize {
        self.switches.load(Ordering::SeqCst)
    }

    /// Make subsequent queries fail with a runtime error.
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent switches fail with a runtime error.
    pub fn fail_switches(&self, fail: bool) {
        self.fail_switches.store(fail, Ordering::SeqCst);
    }
}

impl DeviceRuntime for InMemoryRuntime {
    fn current_device(&self) -> Result<i32> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(RuntimeDeviceError::new(3, "device query failed"));
        }
        Ok(self.active.load(Ordering::SeqCst))
    }

    fn set_device(&self, device: i32) -> Result<()> {
        self.switches.fetch_add(1, Ordering::SeqCst);
        if self.fail_switches.load(Ordering::SeqCst) {
            return Err(RuntimeDeviceError::new(3, "device switch failed"));
        }
        if device < 0 || device >= self.device_count {
            return Err(RuntimeDeviceError::invalid_device(device));
        }
        self.active.store(device, Ordering::SeqCst);
        Ok(())
    }
}

static DEFAULT_RUNTIME: OnceCell<Arc<dyn DeviceRuntime>> = OnceCell::new();

/// Process-wide register used by the guard's convenience constructors.
///
/// Resolved once on first use: the CUDA backend when the `cuda` feature is
/// enabled and a device is visible, [`NoopRuntime`] otherwise.
pub fn default_runtime() -> Arc<dyn DeviceRuntime> {
    DEFAULT_RUNTIME.get_or_init(detect_runtime).clone()
}

/// Install `runtime` as the process-wide default.
///
/// Returns `false` if a default was already resolved or installed; the first
/// caller wins and later calls leave the default unchanged.
pub fn set_default_runtime(runtime: Arc<dyn DeviceRuntime>) -> bool {
    DEFAULT_RUNTIME.set(runtime).is_ok()
}

fn detect_runtime() -> Arc<dyn DeviceRuntime> {
    #[cfg(feature = "cuda")]
    {
        if crate::cuda::CudaRuntime::is_available() {
            return Arc::new(crate::cuda::CudaRuntime::new());
        }
        log::warn!("no CUDA device visible, device switching is disabled");
    }
    Arc::new(NoopRuntime)
}
