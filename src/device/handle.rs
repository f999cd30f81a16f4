use std::sync::{Arc, Mutex, PoisonError};

use log::{info, warn};

use crate::device::ScopeDevice;
use crate::error::{PanoscopeError, Result};

/// Shared slot holding the active device.
///
/// The session, the arrange worker and a frame pump may all hold clones.
/// Swapping devices keeps the lock for the whole "stop old, install new"
/// sequence so no caller observes a half-replaced device.
#[derive(Clone, Default)]
pub struct DeviceHandle {
    inner: Arc<Mutex<Option<Box<dyn ScopeDevice>>>>,
}

impl DeviceHandle {
    pub fn new(device: Box<dyn ScopeDevice>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(device))),
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Run `f` against the device while holding the lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn ScopeDevice) -> Result<R>) -> Result<R> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(device) => f(device.as_mut()),
            None => Err(PanoscopeError::DeviceDisconnected),
        }
    }

    /// Stop the current device (if any) and install `device`.
    pub fn replace(&self, device: Box<dyn ScopeDevice>) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = guard.as_mut() {
            if let Err(e) = old.set_running(false) {
                warn!("stopping {} failed: {e}", old.name());
            }
            info!("replacing {} with {}", old.name(), device.name());
        } else {
            info!("installing {}", device.name());
        }
        *guard = Some(device);
    }

    /// Stop and remove the current device.
    pub fn disconnect(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut old) = guard.take() {
            if let Err(e) = old.set_running(false) {
                warn!("stopping {} failed: {e}", old.name());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SimulatedDevice;

    #[test]
    fn disconnected_handle_errors() {
        let handle = DeviceHandle::disconnected();
        let err = handle.with(|d| Ok(d.running())).unwrap_err();
        assert!(matches!(err, PanoscopeError::DeviceDisconnected));
    }

    #[test]
    fn replace_stops_previous_device() {
        let handle = DeviceHandle::new(Box::new(SimulatedDevice::new("old")));
        handle.with(|d| d.set_running(true)).unwrap();
        let other = handle.clone();
        other.replace(Box::new(SimulatedDevice::new("new")));
        assert_eq!(handle.with(|d| Ok(d.name().to_string())).unwrap(), "new");
        assert!(!handle.with(|d| Ok(d.running())).unwrap());
    }
}
