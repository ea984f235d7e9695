use std::collections::HashMap;
use std::fmt;

use futures::{Stream, StreamExt};
use uuid::Uuid;

use crate::adapter::{AdapterEvent, Command, PowerState, RadioAdapter};
use crate::config::{Rediscovery, RegistryConfig};
use crate::error::{Error, Result};
use crate::{ConnectionState, Device, DeviceId, Service};

/// Phase of the local radio, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RadioPhase {
    #[default]
    Initializing,
    Scanning,
    WaitingForPower,
    Unknown,
}

impl RadioPhase {
    pub fn label(self) -> &'static str {
        match self {
            RadioPhase::Initializing => "Initializing...",
            RadioPhase::Scanning => "Scanning...",
            RadioPhase::WaitingForPower => "Waiting for Bluetooth PowerOn...",
            RadioPhase::Unknown => "<unknown state>",
        }
    }
}

impl fmt::Display for RadioPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Read-only view of the registry handed to change listeners.
pub struct RegistryView<'a> {
    phase: RadioPhase,
    devices: &'a [Device],
}

impl<'a> RegistryView<'a> {
    pub fn radio_state(&self) -> &'static str {
        self.phase.label()
    }

    pub fn phase(&self) -> RadioPhase {
        self.phase
    }

    /// Devices in first-discovered order
    pub fn devices(&self) -> &'a [Device] {
        self.devices
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            devices: self.devices.to_vec(),
        }
    }
}

/// Owned copy of the registry state at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    phase: RadioPhase,
    devices: Vec<Device>,
}

impl Snapshot {
    pub fn radio_state(&self) -> &'static str {
        self.phase.label()
    }

    pub fn phase(&self) -> RadioPhase {
        self.phase
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.iter().find(|device| &device.id == id)
    }
}

type Listener = Box<dyn FnMut(&RegistryView<'_>) + Send>;

/// Every peripheral seen since the registry was started, keyed by id.
///
/// Each [`AdapterEvent`] passed to [`Registry::handle`] that changes the state
/// is followed by exactly one call of every listener, in registration order.
pub struct Registry<A> {
    config: RegistryConfig,
    adapter: Option<A>,
    phase: RadioPhase,
    /// Devices in first-discovered order
    devices: Vec<Device>,
    /// Position of each device in `devices`
    index: HashMap<DeviceId, usize>,
    listeners: Vec<Listener>,
}

impl<A: RadioAdapter> Default for Registry<A> {
    fn default() -> Self {
        Registry::new(RegistryConfig::default())
    }
}

impl<A: RadioAdapter> Registry<A> {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            adapter: None,
            phase: RadioPhase::Initializing,
            devices: Vec::new(),
            index: HashMap::new(),
            listeners: Vec::new(),
        }
    }

    /// Take over the radio and start accepting its events.
    ///
    /// A registry can only be started once.
    pub fn start(&mut self, adapter: A) -> Result<()> {
        if self.adapter.is_some() {
            return Err(Error::AlreadyStarted);
        }

        log::info!("Registry started");
        self.adapter = Some(adapter);

        Ok(())
    }

    pub fn adapter(&self) -> Option<&A> {
        self.adapter.as_ref()
    }

    pub fn radio_state(&self) -> &'static str {
        self.phase.label()
    }

    pub fn phase(&self) -> RadioPhase {
        self.phase
    }

    /// Copy of all known devices in first-discovered order
    pub fn devices(&self) -> Vec<Device> {
        self.devices.clone()
    }

    pub fn device(&self, id: &DeviceId) -> Option<&Device> {
        self.index.get(id).map(|&i| &self.devices[i])
    }

    pub fn snapshot(&self) -> Snapshot {
        self.view().snapshot()
    }

    /// Register a listener that is called after every change.
    pub fn on_changed(&mut self, listener: impl FnMut(&RegistryView<'_>) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Apply a single event from the radio.
    ///
    /// Events about peripherals that were never discovered are rejected with
    /// [`Error::UnknownPeripheral`] and leave the registry untouched.
    pub fn handle(&mut self, event: AdapterEvent) -> Result<()> {
        // Only `apply` runs without the adapter in place; it is always put back.
        let mut adapter = self.adapter.take().ok_or(Error::NotStarted)?;
        let applied = self.apply(event, &mut adapter);
        self.adapter = Some(adapter);

        if applied? {
            self.notify();
        }

        Ok(())
    }

    fn apply(&mut self, event: AdapterEvent, adapter: &mut A) -> Result<bool> {
        let changed = match event {
            AdapterEvent::StateChanged(state) => self.on_state_changed(state, adapter),
            AdapterEvent::PeripheralDiscovered { id, name } => {
                self.on_discovered(id, name, adapter)
            }
            AdapterEvent::PeripheralConnected(id) => self.on_connected(id, adapter)?,
            AdapterEvent::PeripheralConnectFailed(id) => {
                self.transition(&id, ConnectionState::FailedToConnect)?
            }
            AdapterEvent::PeripheralDisconnected(id) => {
                self.transition(&id, ConnectionState::Disconnected)?
            }
            AdapterEvent::ServicesDiscovered { id, services } => {
                self.on_services_discovered(&id, services)?
            }
            AdapterEvent::CharacteristicsDiscovered {
                id,
                service,
                characteristics,
            } => self.on_characteristics_discovered(&id, service, characteristics)?,
        };

        Ok(changed)
    }

    /// Handle events until the stream ends or an event violates the
    /// discovery-before-use contract.
    pub async fn run<S>(&mut self, events: S) -> Result<()>
    where
        S: Stream<Item = AdapterEvent>,
    {
        futures::pin_mut!(events);

        while let Some(event) = events.next().await {
            log::trace!("Adapter event: {:?}", event);
            self.handle(event)?;
        }

        Ok(())
    }

    fn on_state_changed(&mut self, state: PowerState, adapter: &mut A) -> bool {
        self.phase = match state {
            PowerState::PoweredOn => {
                issue(adapter, Command::StartScan);
                RadioPhase::Scanning
            }
            PowerState::PoweredOff
            | PowerState::Resetting
            | PowerState::Unauthorized
            | PowerState::Unknown
            | PowerState::Unsupported => {
                issue(adapter, Command::StopScan);
                RadioPhase::WaitingForPower
            }
            PowerState::Unrecognized(code) => {
                log::warn!("{}", Error::UnrecognizedAdapterState(code));
                RadioPhase::Unknown
            }
        };

        log::info!("Radio state {:?}: {}", state, self.phase);

        true
    }

    fn on_discovered(&mut self, id: DeviceId, name: Option<String>, adapter: &mut A) -> bool {
        let Some(&i) = self.index.get(&id) else {
            log::info!("Discovered {} ({:?}), connecting", id, name);

            self.index.insert(id.clone(), self.devices.len());
            self.devices.push(Device::new(id.clone(), name));
            issue(adapter, Command::Connect(id));

            return true;
        };

        let device = &mut self.devices[i];

        match self.config.rediscovery {
            Rediscovery::Reconnect if device.state.is_terminal() => {
                log::info!("Rediscovered {} after {}, reconnecting", id, device.state);

                device.state = ConnectionState::Connecting;
                if name.is_some() {
                    device.name = name;
                }
                issue(adapter, Command::Connect(id));

                true
            }
            _ => {
                log::trace!("Ignoring rediscovery of {}", id);
                false
            }
        }
    }

    fn on_connected(&mut self, id: DeviceId, adapter: &mut A) -> Result<bool> {
        if !self.transition(&id, ConnectionState::Connected)? {
            return Ok(false);
        }

        log::info!("Connected to {}", id);
        issue(adapter, Command::DiscoverServices(id));

        Ok(true)
    }

    fn on_services_discovered(&mut self, id: &DeviceId, services: Vec<Uuid>) -> Result<bool> {
        let device = self.device_mut(id)?;

        if services.is_empty() {
            return Ok(false);
        }

        log::debug!("{} services discovered on {}", services.len(), id);
        device
            .services
            .extend(services.into_iter().map(Service::new));

        Ok(true)
    }

    fn on_characteristics_discovered(
        &mut self,
        id: &DeviceId,
        service: Uuid,
        characteristics: Vec<Uuid>,
    ) -> Result<bool> {
        let device = self.device_mut(id)?;

        // A service may have been reported more than once; the latest copy gets the characteristics.
        let target = device
            .services
            .iter_mut()
            .rev()
            .find(|s| s.uuid == service)
            .ok_or_else(|| Error::UnknownService {
                id: id.clone(),
                service,
            })?;

        if characteristics.is_empty() {
            return Ok(false);
        }

        log::debug!(
            "{} characteristics discovered on {} service {}",
            characteristics.len(),
            id,
            service
        );
        target.characteristics.extend(
            characteristics
                .into_iter()
                .map(crate::Characteristic::new),
        );

        Ok(true)
    }

    /// Move a device to `next` if that is a legal step from its current state.
    fn transition(&mut self, id: &DeviceId, next: ConnectionState) -> Result<bool> {
        let device = self.device_mut(id)?;

        if !device.state.can_become(next) {
            log::warn!(
                "Ignoring transition of {} from {:?} to {:?}",
                id,
                device.state,
                next
            );
            return Ok(false);
        }

        device.state = next;

        Ok(true)
    }

    fn device_mut(&mut self, id: &DeviceId) -> Result<&mut Device> {
        let i = *self
            .index
            .get(id)
            .ok_or_else(|| Error::UnknownPeripheral(id.clone()))?;

        Ok(&mut self.devices[i])
    }

    fn view(&self) -> RegistryView<'_> {
        RegistryView {
            phase: self.phase,
            devices: &self.devices,
        }
    }

    fn notify(&mut self) {
        let mut listeners = std::mem::take(&mut self.listeners);
        let view = self.view();

        for listener in listeners.iter_mut() {
            listener(&view);
        }

        self.listeners = listeners;
    }
}

fn issue<A: RadioAdapter>(adapter: &mut A, command: Command) {
    log::debug!("Issuing {:?}", command);

    match command {
        Command::StartScan => adapter.start_scan(),
        Command::StopScan => adapter.stop_scan(),
        Command::Connect(id) => adapter.connect(&id),
        Command::DiscoverServices(id) => adapter.discover_services(&id),
    }
}
