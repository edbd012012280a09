//! Residency reporting for tensor-like values.
//!
//! A guard built from a tensor targets the device the tensor lives on;
//! host-resident tensors express no preference and leave the register alone.

use candle_core::{Device, DeviceLocation, Tensor};

use crate::runtime::NO_DEVICE;

/// A value that knows whether its storage lives on an accelerator device.
pub trait DeviceResident {
    /// True when the storage lives on an accelerator rather than in host
    /// memory.
    fn is_accelerator_resident(&self) -> bool;

    /// Index of the device holding the storage. Meaningful only when
    /// [`is_accelerator_resident`](Self::is_accelerator_resident) is true.
    fn device_index(&self) -> i32;

    /// Device index a guard should target for this value, [`NO_DEVICE`] for
    /// host-resident values.
    fn preferred_device(&self) -> i32 {
        if self.is_accelerator_resident() {
            self.device_index()
        } else {
            NO_DEVICE
        }
    }
}

/// Device index a guard should target for a batch of values.
///
/// The first element decides; an empty batch expresses no preference.
pub fn preferred_device_of<T: DeviceResident>(values: &[T]) -> i32 {
    values
        .first()
        .map(|value| value.preferred_device())
        .unwrap_or(NO_DEVICE)
}

impl DeviceResident for Device {
    fn is_accelerator_resident(&self) -> bool {
        !matches!(self.location(), DeviceLocation::Cpu)
    }

    fn device_index(&self) -> i32 {
        match self.location() {
            DeviceLocation::Cpu => NO_DEVICE,
            DeviceLocation::Cuda { gpu_id } => gpu_id as i32,
            DeviceLocation::Metal { gpu_id } => gpu_id as i32,
        }
    }
}

impl DeviceResident for Tensor {
    fn is_accelerator_resident(&self) -> bool {
        self.device().is_accelerator_resident()
    }

    fn device_index(&self) -> i32 {
        self.device().device_index()
    }
}
