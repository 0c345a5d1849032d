use crate::constants::{ENDPOINT_IN, ENDPOINT_OUT, INTERFACE, PID, RESET_SETTLE, VID};
use crate::error::{Error, Result};
use crate::transport::Transport;
use bytes::Bytes;
use nusb::transfer::RequestBuffer;
use nusb::{Device, DeviceInfo, Interface};
use serde::Serialize;
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, trace};

/// An attached DI-2108 as seen during enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub bus: u8,
    pub address: u8,
    pub serial: Option<String>,
    pub product: Option<String>,
}

impl From<&DeviceInfo> for DeviceSummary {
    fn from(info: &DeviceInfo) -> Self {
        Self {
            bus: info.bus_number(),
            address: info.device_address(),
            serial: info.serial_number().map(str::to_string),
            product: info.product_string().map(str::to_string),
        }
    }
}

impl fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bus {:03} addr {:03} serial {} ({})",
            self.bus,
            self.address,
            self.serial.as_deref().unwrap_or("<none>"),
            self.product.as_deref().unwrap_or("DI-2108")
        )
    }
}

fn is_di2108(info: &DeviceInfo) -> bool {
    info.vendor_id() == VID && info.product_id() == PID
}

/// Every DI-2108 currently attached.
pub fn list_devices() -> Result<Vec<DeviceSummary>> {
    let devices = nusb::list_devices().map_err(Error::Usb)?;
    Ok(devices.filter(is_di2108).map(|d| DeviceSummary::from(&d)).collect())
}

/// Bulk endpoint pair of a claimed DI-2108.
///
/// The kernel driver is detached when the interface is claimed and
/// reattached when the interface is released, either by [`close`](Self::close)
/// or on drop.
pub struct UsbTransport {
    device: Device,
    interface: Interface,
    summary: DeviceSummary,
}

impl UsbTransport {
    /// Find an instrument (optionally by serial number), reset it and claim
    /// its interface.
    pub async fn open(serial: Option<&str>, reset: bool) -> Result<Self> {
        info!("Searching for DATAQ DI-2108...");
        let device_info = nusb::list_devices()
            .map_err(Error::Usb)?
            .filter(is_di2108)
            .find(|d| serial.is_none() || d.serial_number() == serial)
            .ok_or(Error::DeviceNotFound)?;

        let summary = DeviceSummary::from(&device_info);
        info!("Found device on {}", summary);

        let device = device_info.open().map_err(Error::Usb)?;
        if reset {
            info!("Performing USB device reset...");
            device.reset().map_err(Error::Usb)?;
            tokio::time::sleep(RESET_SETTLE).await;
        }

        let interface = device.detach_and_claim_interface(INTERFACE).map_err(claim_error)?;
        info!("Interface claimed successfully.");

        Ok(Self {
            device,
            interface,
            summary,
        })
    }

    pub fn summary(&self) -> &DeviceSummary {
        &self.summary
    }

    /// Reset the instrument and release the interface back to the kernel.
    pub fn close(self) -> Result<()> {
        info!("Releasing {}", self.summary);
        let result = self.device.reset().map_err(Error::Usb);
        drop(self.interface);
        result
    }
}

fn claim_error(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::ResourceBusy {
        Error::DeviceBusy
    } else {
        Error::Usb(err)
    }
}

impl Transport for UsbTransport {
    async fn write(&mut self, data: Bytes, limit: Duration) -> Result<usize> {
        debug!(bytes = hex::encode(&data), "USB Write");
        let transfer = self.interface.bulk_out(ENDPOINT_OUT, data.to_vec());
        let completion = timeout(limit, transfer).await.map_err(|_| Error::Timeout {
            operation: "bulk OUT",
            timeout: limit,
        })?;
        let sent = completion.into_result()?;
        Ok(sent.actual_length())
    }

    async fn read(&mut self, max_len: usize, limit: Duration) -> Result<Bytes> {
        let transfer = self.interface.bulk_in(ENDPOINT_IN, RequestBuffer::new(max_len));
        let completion = timeout(limit, transfer).await.map_err(|_| {
            trace!(?limit, "USB Read timed out");
            Error::Timeout {
                operation: "bulk IN",
                timeout: limit,
            }
        })?;
        let data = completion.into_result()?;
        debug!(bytes = hex::encode(&data), "USB Read");
        Ok(Bytes::from(data))
    }
}
