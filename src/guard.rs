//! Scoped switching of the accelerator's active device.

use std::sync::Arc;

use crate::error::Result;
use crate::resident::{preferred_device_of, DeviceResident};
use crate::runtime::{default_runtime, DeviceRuntime, NO_DEVICE};

/// Switches the runtime's active device for the lifetime of the guard and
/// restores the previous device when the guard is dropped, on every exit
/// path.
///
/// The first switch records the device that was active beforehand; that
/// recording happens at most once per guard. Later
/// [`set_device`](DeviceScopeGuard::set_device) calls
/// re-target the register unconditionally, and the drop still restores the
/// originally recorded device, not any intermediate one.
///
/// Restoration on drop is best effort: a failing restore is logged and never
/// propagated.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use device_scope::{DeviceScopeGuard, InMemoryRuntime};
///
/// let runtime = Arc::new(InMemoryRuntime::new(2));
/// {
///     let _guard = DeviceScopeGuard::with_runtime(runtime.clone(), 1)?;
///     assert_eq!(runtime.active(), 1);
/// }
/// assert_eq!(runtime.active(), 0);
/// # Ok::<(), device_scope::RuntimeDeviceError>(())
/// ```
pub struct DeviceScopeGuard {
    runtime: Arc<dyn DeviceRuntime>,
    original_device: i32,
}

impl std::fmt::Debug for DeviceScopeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceScopeGuard")
            .field("original_device", &self.original_device)
            .finish_non_exhaustive()
    }
}

impl DeviceScopeGuard {
    /// Guard targeting an explicit device index on the process-default
    /// runtime. [`NO_DEVICE`] builds a guard that never touches the
    /// register.
    pub fn new(device: i32) -> Result<Self> {
        Self::with_runtime(default_runtime(), device)
    }

    /// Guard targeting the device a tensor-like value lives on.
    /// Host-resident values yield a no-op guard.
    pub fn for_value<T: DeviceResident>(value: &T) -> Result<Self> {
        Self::new(value.preferred_device())
    }

    /// Guard targeting the device of the first value in a batch. An empty
    /// batch yields a no-op guard.
    pub fn for_values<T: DeviceResident>(values: &[T]) -> Result<Self> {
        Self::new(preferred_device_of(values))
    }

    /// Guard targeting `device` on an explicitly injected runtime.
    pub fn with_runtime(runtime: Arc<dyn DeviceRuntime>, device: i32) -> Result<Self> {
        let mut guard = Self {
            runtime,
            original_device: NO_DEVICE,
        };
        if let Err(err) = guard.set_device(device) {
            // The caller never receives the guard, so it must not restore.
            // No rollback is attempted either: the register stays wherever
            // the runtime left it.
            guard.original_device = NO_DEVICE;
            return Err(err);
        }
        Ok(guard)
    }

    /// Switch the active device within this guard's scope.
    ///
    /// The first effective call records the previously active device and
    /// skips the switch when the register already points at `device`. Every
    /// later call switches unconditionally: once the guard owns the original
    /// device, a repeat call is an intentional re-target.
    pub fn set_device(&mut self, device: i32) -> Result<()> {
        if device == NO_DEVICE {
            return Ok(());
        }
        if self.original_device == NO_DEVICE {
            let current = self.runtime.current_device()?;
            self.original_device = current;
            if device != current {
                self.runtime.set_device(device)?;
            }
        } else {
            self.runtime.set_device(device)?;
        }
        Ok(())
    }

    /// Device that was active before this guard switched, [`NO_DEVICE`]
    /// while no switch has been recorded.
    pub fn original_device(&self) -> i32 {
        self.original_device
    }
}

impl Drop for DeviceScopeGuard {
    fn drop(&mut self) {
        if self.original_device == NO_DEVICE {
            return;
        }
        if let Err(err) = self.runtime.set_device(self.original_device) {
            log::warn!(
                "failed to restore active device {}: {}",
                self.original_device,
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::STATUS_INVALID_DEVICE;
    use crate::runtime::InMemoryRuntime;

    fn runtime(device_count: i32, active: i32) -> Arc<InMemoryRuntime> {
        Arc::new(InMemoryRuntime::with_active(device_count, active))
    }

    #[test]
    fn switches_and_restores() -> Result<()> {
        let rt = runtime(2, 0);
        {
            let guard = DeviceScopeGuard::with_runtime(rt.clone(), 1)?;
            assert_eq!(rt.active(), 1);
            assert_eq!(guard.original_device(), 0);
        }
        assert_eq!(rt.active(), 0);
        Ok(())
    }

    #[test]
    fn no_preference_makes_no_runtime_calls() -> Result<()> {
        let rt = runtime(3, 2);
        {
            let guard = DeviceScopeGuard::with_runtime(rt.clone(), NO_DEVICE)?;
            assert_eq!(guard.original_device(), NO_DEVICE);
            assert_eq!(rt.active(), 2);
        }
        assert_eq!(rt.active(), 2);
        assert_eq!(rt.query_calls(), 0);
        assert_eq!(rt.switch_calls(), 0);
        Ok(())
    }

    #[test]
    fn sequential_no_preference_guards_stay_silent() -> Result<()> {
        let rt = runtime(3, 2);
        for _ in 0..4 {
            let _guard = DeviceScopeGuard::with_runtime(rt.clone(), NO_DEVICE)?;
        }
        assert_eq!(rt.active(), 2);
        assert_eq!(rt.query_calls(), 0);
        assert_eq!(rt.switch_calls(), 0);
        Ok(())
    }

    #[test]
    fn same_device_skips_the_switch() -> Result<()> {
        let rt = runtime(2, 1);
        {
            let guard = DeviceScopeGuard::with_runtime(rt.clone(), 1)?;
            assert_eq!(guard.original_device(), 1);
            assert_eq!(rt.query_calls(), 1);
            assert_eq!(rt.switch_calls(), 0);
        }
        // An original device was recorded, so the drop still restores.
        assert_eq!(rt.switch_calls(), 1);
        assert_eq!(rt.active(), 1);
        Ok(())
    }

    #[test]
    fn retarget_switches_unconditionally_and_restores_first_original() -> Result<()> {
        let rt = runtime(4, 0);
        {
            let mut guard = DeviceScopeGuard::with_runtime(rt.clone(), 1)?;
            guard.set_device(2)?;
            assert_eq!(rt.active(), 2);

            // Re-targeting the already active device still hits the runtime.
            let switches = rt.switch_calls();
            guard.set_device(2)?;
            assert_eq!(rt.switch_calls(), switches + 1);

            // The original device is recorded once and never re-queried.
            assert_eq!(guard.original_device(), 0);
            assert_eq!(rt.query_calls(), 1);
        }
        assert_eq!(rt.active(), 0);
        Ok(())
    }

    #[test]
    fn failed_query_fails_construction() {
        let rt = runtime(2, 0);
        rt.fail_queries(true);
        let err = DeviceScopeGuard::with_runtime(rt.clone(), 1).unwrap_err();
        assert_eq!(err.code, 3);
        assert_eq!(rt.active(), 0);
        // No restore is attempted for a guard the caller never received.
        assert_eq!(rt.switch_calls(), 0);
    }

    #[test]
    fn failed_switch_fails_construction_without_rollback() {
        let rt = runtime(2, 0);
        rt.fail_switches(true);
        assert!(DeviceScopeGuard::with_runtime(rt.clone(), 1).is_err());
        assert_eq!(rt.active(), 0);
        assert_eq!(rt.switch_calls(), 1);
    }

    #[test]
    fn out_of_range_device_fails_construction() {
        let rt = runtime(1, 0);
        let err = DeviceScopeGuard::with_runtime(rt.clone(), 5).unwrap_err();
        assert_eq!(err.code, STATUS_INVALID_DEVICE);
        assert_eq!(rt.active(), 0);
    }

    #[test]
    fn failed_retarget_keeps_restore_armed() -> Result<()> {
        let rt = runtime(2, 0);
        {
            let mut guard = DeviceScopeGuard::with_runtime(rt.clone(), 1)?;
            rt.fail_switches(true);
            assert!(guard.set_device(0).is_err());
            rt.fail_switches(false);
            assert_eq!(rt.active(), 1);
        }
        assert_eq!(rt.active(), 0);
        Ok(())
    }

    #[test]
    fn host_resident_values_yield_a_noop_guard() -> anyhow::Result<()> {
        use candle_core::{DType, Device, Tensor};

        let tensor = Tensor::zeros((2, 2), DType::F32, &Device::Cpu)?;
        let guard = DeviceScopeGuard::for_value(&tensor)?;
        assert_eq!(guard.original_device(), NO_DEVICE);

        let batch: [Tensor; 0] = [];
        let guard = DeviceScopeGuard::for_values(&batch)?;
        assert_eq!(guard.original_device(), NO_DEVICE);
        Ok(())
    }
}
