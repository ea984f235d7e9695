use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};

use btleplug::api::{Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::{Stream, StreamExt};
use stream_cancel::{Trigger, Valved};
use tokio::sync::broadcast::{self, Sender};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};

use crate::adapter::{AdapterEvent, Command, PowerState, RadioAdapter};
use crate::config::ExplorerConfig;
use crate::error::{Error, Result};
use crate::registry::{Registry, RegistryView, Snapshot};
use crate::DeviceId;

pub(crate) struct Session {
    pub(crate) _manager: Manager,
    pub(crate) adapter: Adapter,
}

/// Peripherals reported to the registry so far, by the id the registry knows them by.
type KnownPeripherals = Arc<Mutex<HashMap<DeviceId, PeripheralId>>>;

/// [`RadioAdapter`] that hands every command to a btleplug worker task.
pub struct BtleplugAdapter {
    commands: UnboundedSender<Command>,
}

impl BtleplugAdapter {
    fn send(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            log::warn!("Bluetooth worker is gone, dropping {:?}", e.0);
        }
    }
}

impl RadioAdapter for BtleplugAdapter {
    fn start_scan(&mut self) {
        self.send(Command::StartScan);
    }

    fn stop_scan(&mut self) {
        self.send(Command::StopScan);
    }

    fn connect(&mut self, id: &DeviceId) {
        self.send(Command::Connect(id.clone()));
    }

    fn discover_services(&mut self, id: &DeviceId) {
        self.send(Command::DiscoverServices(id.clone()));
    }
}

/// Scans for BLE peripherals, connects to all of them and keeps a [`Registry`]
/// of what was found up to date.
///
/// The registry lives on its own task and is the only writer of its state;
/// btleplug events and command results reach it through one queue.
pub struct Explorer {
    config: ExplorerConfig,
    /// Present until the explorer is started
    registry: Option<Registry<BtleplugAdapter>>,
    session: Option<Arc<Session>>,
    latest: Arc<RwLock<Snapshot>>,
    snapshot_sender: Sender<Snapshot>,
    central_stopper: Option<Trigger>,
    queue_stopper: Option<Trigger>,
    change_stream_stoppers: Arc<RwLock<Vec<Trigger>>>,
    task: Option<JoinHandle<Result<()>>>,
}

impl Default for Explorer {
    fn default() -> Self {
        Explorer::new(ExplorerConfig::default())
    }
}

impl Explorer {
    pub fn new(config: ExplorerConfig) -> Self {
        let (snapshot_sender, _) = broadcast::channel(config.event_buffer);
        let latest = Arc::new(RwLock::new(Snapshot::default()));

        let mut registry = Registry::new(config.registry.clone());

        let listener_latest = latest.clone();
        let listener_sender = snapshot_sender.clone();
        registry.on_changed(move |view| {
            let snapshot = view.snapshot();
            *listener_latest.write().unwrap() = snapshot.clone();
            // No receivers is fine.
            listener_sender.send(snapshot).ok();
        });

        Self {
            config,
            registry: Some(registry),
            session: None,
            latest,
            snapshot_sender,
            central_stopper: None,
            queue_stopper: None,
            change_stream_stoppers: Arc::new(RwLock::new(Vec::new())),
            task: None,
        }
    }

    /// Register a listener that runs on the registry task after every change.
    ///
    /// Listeners can only be added before the explorer is started.
    pub fn on_changed(
        &mut self,
        listener: impl FnMut(&RegistryView<'_>) + Send + 'static,
    ) -> Result<()> {
        let registry = self.registry.as_mut().ok_or(Error::AlreadyStarted)?;
        registry.on_changed(listener);

        Ok(())
    }

    /// Latest state of the registry.
    pub fn snapshot(&self) -> Snapshot {
        self.latest.read().unwrap().clone()
    }

    /// Create a new stream that receives a snapshot after every change.
    pub fn change_stream(&mut self) -> Valved<Pin<Box<dyn Stream<Item = Snapshot> + Send>>> {
        let receiver = self.snapshot_sender.subscribe();

        let stream: Pin<Box<dyn Stream<Item = Snapshot> + Send>> =
            Box::pin(BroadcastStream::new(receiver).filter_map(|x| async move { x.ok() }));

        let (trigger, stream) = Valved::new(stream);
        self.change_stream_stoppers.write().unwrap().push(trigger);

        stream
    }

    /// Open the Bluetooth adapter and start tracking peripherals.
    pub async fn start(&mut self) -> Result<()> {
        if self.registry.is_none() {
            return Err(Error::AlreadyStarted);
        }

        let manager = Manager::new().await?;
        let mut adapters = manager.adapters().await?;

        if self.config.adapter_index >= adapters.len() {
            return Err(Error::AdapterNotFound(self.config.adapter_index));
        }

        let adapter = adapters.swap_remove(self.config.adapter_index);

        log::trace!("Using adapter: {:?}", adapter);

        let session = Arc::new(Session {
            _manager: manager,
            adapter,
        });

        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let (command_sender, command_receiver) = mpsc::unbounded_channel();
        let known: KnownPeripherals = Arc::new(Mutex::new(HashMap::new()));

        let (central_stopper, central_events) = Valved::new(session.adapter.events().await?);

        let listener = CentralListener {
            session: session.clone(),
            known: known.clone(),
            events: event_sender.clone(),
        };
        tokio::spawn(listener.listen(central_events));

        let worker = CommandWorker {
            session: session.clone(),
            known,
            events: event_sender,
        };
        tokio::spawn(worker.run(command_receiver));

        let mut registry = self.registry.take().ok_or(Error::AlreadyStarted)?;
        registry.start(BtleplugAdapter {
            commands: command_sender,
        })?;

        let (queue_stopper, queue) = Valved::new(UnboundedReceiverStream::new(event_receiver));
        let change_stream_stoppers = self.change_stream_stoppers.clone();

        self.task = Some(tokio::spawn(async move {
            let result = registry.run(queue).await;

            if let Err(e) = &result {
                log::error!("Registry stopped: {}", e);
            }
            change_stream_stoppers.write().unwrap().clear();

            result
        }));

        self.central_stopper = Some(central_stopper);
        self.queue_stopper = Some(queue_stopper);
        self.session = Some(session);

        log::info!("Explorer started");

        Ok(())
    }

    /// Stop scanning and tracking peripherals.
    ///
    /// Returns the error that ended the registry early, if any.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            log::info!("Explorer is not running");
            return Ok(());
        };

        let stopped = session.adapter.stop_scan().await;

        self.central_stopper.take();
        self.queue_stopper.take();
        self.change_stream_stoppers.write().unwrap().clear();

        if let Some(task) = self.task.take() {
            task.await.map_err(|e| Error::TaskFailed(e.to_string()))??;
        }

        stopped?;

        log::info!("Explorer was stopped.");

        Ok(())
    }
}

/// A central event that matters to the registry, with the peripheral
/// already translated to the id the registry knows it by.
enum CentralSignal {
    State(CentralState),
    /// Discovered for the first time or advertised again.
    Seen { id: DeviceId, name: Option<String> },
    Connected(DeviceId),
    Disconnected(DeviceId),
}

/// Registry event for a central signal, if the registry should hear about it.
///
/// Connection changes of peripherals that were never reported as discovered
/// are dropped, since the registry rejects events for unknown ids.
fn adapter_event<P>(signal: CentralSignal, known: &HashMap<DeviceId, P>) -> Option<AdapterEvent> {
    match signal {
        CentralSignal::State(state) => Some(AdapterEvent::StateChanged(power_state(state))),
        CentralSignal::Seen { id, name } => Some(AdapterEvent::PeripheralDiscovered { id, name }),
        CentralSignal::Connected(id) if known.contains_key(&id) => {
            Some(AdapterEvent::PeripheralConnected(id))
        }
        CentralSignal::Disconnected(id) if known.contains_key(&id) => {
            Some(AdapterEvent::PeripheralDisconnected(id))
        }
        CentralSignal::Connected(id) | CentralSignal::Disconnected(id) => {
            log::debug!("Ignoring connection change of unreported peripheral {}", id);
            None
        }
    }
}

fn power_state(state: CentralState) -> PowerState {
    match state {
        CentralState::PoweredOn => PowerState::PoweredOn,
        CentralState::PoweredOff => PowerState::PoweredOff,
        _ => PowerState::Unknown,
    }
}

/// The platform only reports state changes, so the state at startup is read
/// once. Without it nothing would ever start the scan.
fn initial_power_state(state: btleplug::Result<CentralState>) -> PowerState {
    match state {
        Ok(state) => power_state(state),
        Err(e) => {
            log::warn!("Could not read adapter state, assuming powered on: {}", e);
            PowerState::PoweredOn
        }
    }
}

/// Turns btleplug central events into registry events.
///
/// Connection successes and disconnects both come from the central event
/// stream, so the registry sees them in the order the platform raised them.
struct CentralListener {
    session: Arc<Session>,
    known: KnownPeripherals,
    events: UnboundedSender<AdapterEvent>,
}

impl CentralListener {
    async fn listen(self, mut event_stream: Valved<Pin<Box<dyn Stream<Item = CentralEvent> + Send>>>) {
        let initial = initial_power_state(self.session.adapter.adapter_state().await);
        self.send(AdapterEvent::StateChanged(initial));

        while let Some(event) = event_stream.next().await {
            log::trace!("Central event: {:?}", event);

            let signal = match event {
                CentralEvent::StateUpdate(state) => CentralSignal::State(state),
                CentralEvent::DeviceDiscovered(peripheral_id)
                | CentralEvent::DeviceUpdated(peripheral_id) => {
                    match self.remember(peripheral_id).await {
                        Some(signal) => signal,
                        None => continue,
                    }
                }
                CentralEvent::DeviceConnected(peripheral_id) => {
                    CentralSignal::Connected(device_id(&peripheral_id))
                }
                CentralEvent::DeviceDisconnected(peripheral_id) => {
                    CentralSignal::Disconnected(device_id(&peripheral_id))
                }
                _ => continue,
            };

            let event = adapter_event(signal, &*self.known.lock().unwrap());
            if let Some(event) = event {
                self.send(event);
            }
        }

        log::info!("Central event stream ended.");
    }

    /// Record a seen peripheral so commands can find it later.
    async fn remember(&self, peripheral_id: PeripheralId) -> Option<CentralSignal> {
        let peripheral = self.session.adapter.peripheral(&peripheral_id).await.ok()?;

        let name = peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|props| props.local_name);
        let id = device_id(&peripheral_id);

        self.known
            .lock()
            .unwrap()
            .insert(id.clone(), peripheral_id);

        Some(CentralSignal::Seen { id, name })
    }

    fn send(&self, event: AdapterEvent) {
        self.events.send(event).ok();
    }
}

fn device_id(peripheral_id: &PeripheralId) -> DeviceId {
    DeviceId::from(peripheral_id.to_string())
}

/// Executes registry commands against btleplug and reports their outcome.
#[derive(Clone)]
struct CommandWorker {
    session: Arc<Session>,
    known: KnownPeripherals,
    events: UnboundedSender<AdapterEvent>,
}

impl CommandWorker {
    async fn run(self, mut commands: UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            log::debug!("Executing {:?}", command);

            match command {
                Command::StartScan => {
                    log::info!("Starting the scan");
                    if let Err(e) = self.session.adapter.start_scan(ScanFilter::default()).await {
                        log::warn!("Could not start scan: {}", e);
                    }
                }
                Command::StopScan => {
                    if let Err(e) = self.session.adapter.stop_scan().await {
                        log::warn!("Could not stop scan: {}", e);
                    }
                }
                // Connections and discovery run concurrently so one slow
                // peripheral does not hold up the others.
                Command::Connect(id) => {
                    tokio::spawn(self.clone().connect(id));
                }
                Command::DiscoverServices(id) => {
                    tokio::spawn(self.clone().discover_services(id));
                }
            }
        }
    }

    async fn peripheral(&self, id: &DeviceId) -> Option<Peripheral> {
        let peripheral_id = self.known.lock().unwrap().get(id).cloned()?;

        self.session.adapter.peripheral(&peripheral_id).await.ok()
    }

    async fn connect(self, id: DeviceId) {
        let event = match self.peripheral(&id).await {
            Some(peripheral) => connect_outcome(id, peripheral.connect().await),
            None => {
                log::warn!("Peripheral {} is no longer known to the adapter", id);
                Some(AdapterEvent::PeripheralConnectFailed(id))
            }
        };

        if let Some(event) = event {
            self.events.send(event).ok();
        }
    }

    async fn discover_services(self, id: DeviceId) {
        let Some(peripheral) = self.peripheral(&id).await else {
            log::warn!("Peripheral {} is no longer known to the adapter", id);
            return;
        };

        log::debug!("Discovering services for {}", id);

        if let Err(e) = peripheral.discover_services().await {
            log::warn!("Service discovery failed on {}: {:?}", id, e);
            return;
        }

        let services = peripheral.services();

        self.events
            .send(AdapterEvent::ServicesDiscovered {
                id: id.clone(),
                services: services.iter().map(|service| service.uuid).collect(),
            })
            .ok();

        for service in services {
            self.events
                .send(AdapterEvent::CharacteristicsDiscovered {
                    id: id.clone(),
                    service: service.uuid,
                    characteristics: service
                        .characteristics
                        .iter()
                        .map(|characteristic| characteristic.uuid)
                        .collect(),
                })
                .ok();
        }
    }
}

/// Only failures are reported from the connect call. Success arrives as
/// `CentralEvent::DeviceConnected`, on the same stream as disconnects.
fn connect_outcome(id: DeviceId, result: btleplug::Result<()>) -> Option<AdapterEvent> {
    match result {
        Ok(()) => {
            log::debug!("Connect to {} returned", id);
            None
        }
        Err(e) => {
            log::warn!("Could not connect to {}: {:?}", id, e);
            Some(AdapterEvent::PeripheralConnectFailed(id))
        }
    }
}
