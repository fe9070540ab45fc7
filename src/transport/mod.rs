//! Device transport boundary.
//!
//! The acquisition engine never talks to a device directly; everything goes
//! through [`DeviceTransport`]. [`adb::AdbTransport`] drives the Android
//! debug bridge command-line tool, and tests substitute scripted transports.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::utils::content_rows::ContentRow;

pub mod adb;

pub use adb::AdbTransport;

/// Serial command channel to one connected device.
///
/// Calls are issued one at a time by the engine; implementations do not
/// need to support concurrent commands.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Whether the command-line tool behind this transport can run at all
    async fn is_tool_available(&self) -> bool;

    /// Serial numbers of devices that are connected and authorized
    async fn list_connected_devices(&self) -> Result<Vec<String>, TransportError>;

    /// Try to obtain root on the device; `true` when direct copies may work
    async fn attempt_elevated_access(&self) -> bool;

    /// Full content of a file on the device
    async fn copy_file(&self, device_path: &str) -> Result<Vec<u8>, TransportError>;

    /// Backup container bytes for one package, waiting at most `timeout`
    /// for the user to confirm on the device
    async fn create_backup(&self, package: &str, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    async fn query_content_provider(&self, uri: &str) -> Result<Vec<ContentRow>, TransportError>;

    async fn dump_system_service(&self, service: &str) -> Result<String, TransportError>;
}
