//! Process-default runtime selection.
//!
//! Kept as a single test: the default register is resolved once per process
//! and every assertion here depends on the order of installation.

use std::sync::Arc;

use device_scope::{
    set_default_runtime, DeviceScopeGuard, InMemoryRuntime, NoopRuntime,
};

#[test]
fn installed_default_backs_the_convenience_constructors() -> anyhow::Result<()> {
    device_scope::logging::init_logger();

    let runtime = Arc::new(InMemoryRuntime::new(4));
    assert!(set_default_runtime(runtime.clone()));

    {
        let guard = DeviceScopeGuard::new(2)?;
        assert_eq!(runtime.active(), 2);
        assert_eq!(guard.original_device(), 0);
    }
    assert_eq!(runtime.active(), 0);

    // First caller wins; a second install is refused and changes nothing.
    assert!(!set_default_runtime(Arc::new(NoopRuntime)));
    {
        let _guard = DeviceScopeGuard::new(3)?;
        assert_eq!(runtime.active(), 3);
    }
    assert_eq!(runtime.active(), 0);
    Ok(())
}
