use crate::models::device::{DeviceDirection, DeviceHandle};
use crate::models::error::CaptureError;

/// Source of the live device list.
///
/// Implemented by the platform backends and by test fakes. Listing must be a
/// pure query: it never opens or claims a device.
pub trait DeviceCatalog: Send + Sync {
    fn list(&self, direction: DeviceDirection) -> Result<Vec<DeviceHandle>, CaptureError>;
}

/// A fixed device list, useful when devices come from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    devices: Vec<DeviceHandle>,
}

impl StaticCatalog {
    pub fn new(devices: Vec<DeviceHandle>) -> Self {
        Self { devices }
    }
}

impl DeviceCatalog for StaticCatalog {
    fn list(&self, direction: DeviceDirection) -> Result<Vec<DeviceHandle>, CaptureError> {
        Ok(self
            .devices
            .iter()
            .filter(|d| d.direction == direction)
            .cloned()
            .collect())
    }
}
