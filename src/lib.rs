//! Scoped accelerator device switching.
//!
//! Tensor operations that must run on a specific device wrap themselves in a
//! [`DeviceScopeGuard`]: the guard switches the runtime's active device on
//! construction and restores the previous one when it goes out of scope, on
//! normal and error paths alike. The active-device register is abstracted as
//! a [`DeviceRuntime`] so the guard works against the real CUDA register
//! (`cuda` feature), a no-op backend on accelerator-less hosts, or an
//! in-memory register in tests.

pub mod error;
pub mod guard;
pub mod resident;
pub mod runtime;

#[cfg(feature = "cuda")]
pub mod cuda;

// Re-export common types
pub use error::{Result, RuntimeDeviceError};
pub use guard::DeviceScopeGuard;
pub use resident::{preferred_device_of, DeviceResident};
pub use runtime::{
    default_runtime, set_default_runtime, DeviceRuntime, InMemoryRuntime, NoopRuntime, NO_DEVICE,
};

#[cfg(feature = "cuda")]
pub use cuda::CudaRuntime;

pub mod logging {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    /// Install the process-wide logger used by binaries and tests.
    pub fn init_logger() {
        let _ = Builder::new()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{} [{}] - {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                    record.level(),
                    record.args()
                )
            })
            .filter(None, LevelFilter::Info)
            .try_init();
    }
}
