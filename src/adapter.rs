//! The radio side of the registry: commands it issues and events it consumes.

use uuid::Uuid;

use crate::DeviceId;

/// Power state reported by the platform's BLE central.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
    /// A raw state code outside the known set.
    Unrecognized(u8),
}

/// Follows the CoreBluetooth `CBManagerState` numbering.
impl From<u8> for PowerState {
    fn from(code: u8) -> Self {
        match code {
            0 => PowerState::Unknown,
            1 => PowerState::Resetting,
            2 => PowerState::Unsupported,
            3 => PowerState::Unauthorized,
            4 => PowerState::PoweredOff,
            5 => PowerState::PoweredOn,
            other => PowerState::Unrecognized(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    StateChanged(PowerState),
    PeripheralDiscovered {
        id: DeviceId,
        name: Option<String>,
    },
    PeripheralConnected(DeviceId),
    PeripheralConnectFailed(DeviceId),
    PeripheralDisconnected(DeviceId),
    ServicesDiscovered {
        id: DeviceId,
        services: Vec<Uuid>,
    },
    CharacteristicsDiscovered {
        id: DeviceId,
        service: Uuid,
        characteristics: Vec<Uuid>,
    },
}

/// Commands the registry issues to the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartScan,
    StopScan,
    Connect(DeviceId),
    DiscoverServices(DeviceId),
}

/// A BLE central the registry drives.
///
/// Every method only issues the command; outcomes come back later as
/// [`AdapterEvent`]s.
pub trait RadioAdapter {
    /// Scan for all peripherals, without a service filter.
    fn start_scan(&mut self);

    fn stop_scan(&mut self);

    fn connect(&mut self, id: &DeviceId);

    /// Discover all services and their characteristics of a connected peripheral.
    fn discover_services(&mut self, id: &DeviceId);
}
