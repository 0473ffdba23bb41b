use std::sync::Arc;

use crate::models::device::{DeviceDirection, DeviceHandle};
use crate::models::error::CaptureError;
use crate::traits::device_catalog::DeviceCatalog;

/// Picks the device a job will use.
///
/// Queries the catalog on every call. Device lists change under hot-plug, so
/// nothing is cached between jobs.
#[derive(Clone)]
pub struct DeviceResolver {
    catalog: Arc<dyn DeviceCatalog>,
}

impl DeviceResolver {
    pub fn new(catalog: Arc<dyn DeviceCatalog>) -> Self {
        Self { catalog }
    }

    pub fn resolve(&self, direction: DeviceDirection, keywords: &[String]) -> Result<DeviceHandle, CaptureError> {
        let devices = self.catalog.list(direction)?;
        log::debug!("{} {} device(s) listed", devices.len(), direction);
        let device = select_device(&devices, direction, keywords)?;
        log::info!("Resolved {} device {}", direction, device);
        Ok(device)
    }
}

/// Deterministic preference order over a device list.
///
/// Among devices capable of `direction`, the first whose name contains the
/// earliest keyword (case-insensitive) wins; without a keyword match the
/// first capable device is used.
pub fn select_device(
    devices: &[DeviceHandle],
    direction: DeviceDirection,
    keywords: &[String],
) -> Result<DeviceHandle, CaptureError> {
    let capable: Vec<&DeviceHandle> = devices
        .iter()
        .filter(|d| d.direction == direction && d.capabilities.satisfies(direction))
        .collect();

    for keyword in keywords.iter().map(|k| k.trim().to_lowercase()).filter(|k| !k.is_empty()) {
        if let Some(device) = capable.iter().find(|d| d.name.to_lowercase().contains(&keyword)) {
            log::debug!("Device {} matched keyword '{}'", device, keyword);
            return Ok((*device).clone());
        }
    }

    capable
        .first()
        .map(|d| (*d).clone())
        .ok_or(CaptureError::NoDeviceAvailable(direction))
}
