use std::fmt;

use crate::Service;

/// Platform identifier of a peripheral, stable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    FailedToConnect,
    Disconnected,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Connected => "Connected",
            ConnectionState::FailedToConnect => "Failed to connect",
            ConnectionState::Disconnected => "Disconnected",
        }
    }

    /// Whether the connection attempt has run its course.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectionState::FailedToConnect | ConnectionState::Disconnected
        )
    }

    pub(crate) fn can_become(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Connecting, Connected) | (Connecting, FailedToConnect) | (Connected, Disconnected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A discovered peripheral as recorded by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub(crate) id: DeviceId,
    pub(crate) name: Option<String>,
    pub(crate) state: ConnectionState,
    pub(crate) services: Vec<Service>,
}

impl Device {
    pub(crate) fn new(id: DeviceId, name: Option<String>) -> Self {
        Self {
            id,
            name,
            state: ConnectionState::Connecting,
            services: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// Advertised local name of the device
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Services in the order they were discovered
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Total number of characteristics over all services
    pub fn characteristic_count(&self) -> usize {
        self.services
            .iter()
            .map(|service| service.characteristics.len())
            .sum()
    }
}
