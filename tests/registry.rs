use std::sync::{Arc, Mutex};

use blexplorer::common::{characteristics, services};
use blexplorer::{
    AdapterEvent, Command, ConnectionState, DeviceId, Error, PowerState, RadioAdapter, RadioPhase,
    Registry, RegistryConfig,
};

/// Radio that only remembers what it was asked to do.
#[derive(Default)]
struct RecordingAdapter {
    commands: Vec<Command>,
}

impl RadioAdapter for RecordingAdapter {
    fn start_scan(&mut self) {
        self.commands.push(Command::StartScan);
    }

    fn stop_scan(&mut self) {
        self.commands.push(Command::StopScan);
    }

    fn connect(&mut self, id: &DeviceId) {
        self.commands.push(Command::Connect(id.clone()));
    }

    fn discover_services(&mut self, id: &DeviceId) {
        self.commands.push(Command::DiscoverServices(id.clone()));
    }
}

fn started(config: RegistryConfig) -> Registry<RecordingAdapter> {
    let mut registry = Registry::new(config);
    registry.start(RecordingAdapter::default()).unwrap();
    registry
}

fn commands(registry: &Registry<RecordingAdapter>) -> &[Command] {
    &registry.adapter().unwrap().commands
}

fn count(registry: &Registry<RecordingAdapter>, command: &Command) -> usize {
    commands(registry).iter().filter(|c| *c == command).count()
}

/// Counts notifications and records how many devices each one saw.
fn observe(registry: &mut Registry<RecordingAdapter>) -> Arc<Mutex<Vec<usize>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    registry.on_changed(move |view| sink.lock().unwrap().push(view.devices().len()));
    seen
}

fn discovered(id: &str, name: Option<&str>) -> AdapterEvent {
    AdapterEvent::PeripheralDiscovered {
        id: id.into(),
        name: name.map(str::to_string),
    }
}

fn connected(id: &str) -> AdapterEvent {
    AdapterEvent::PeripheralConnected(id.into())
}

fn disconnected(id: &str) -> AdapterEvent {
    AdapterEvent::PeripheralDisconnected(id.into())
}

fn connect_failed(id: &str) -> AdapterEvent {
    AdapterEvent::PeripheralConnectFailed(id.into())
}

fn state_of(registry: &Registry<RecordingAdapter>, id: &str) -> ConnectionState {
    registry.device(&id.into()).unwrap().state()
}

#[test]
fn power_on_starts_scanning() {
    let mut registry = started(RegistryConfig::default());
    assert_eq!(registry.phase(), RadioPhase::Initializing);

    registry
        .handle(AdapterEvent::StateChanged(PowerState::PoweredOn))
        .unwrap();

    assert_eq!(registry.radio_state(), "Scanning...");
    assert_eq!(commands(&registry), &[Command::StartScan]);
}

#[test]
fn scan_is_requested_again_after_every_power_on() {
    let mut registry = started(RegistryConfig::default());

    for state in [
        PowerState::PoweredOn,
        PowerState::PoweredOff,
        PowerState::PoweredOn,
        PowerState::Resetting,
        PowerState::Unauthorized,
        PowerState::PoweredOn,
    ] {
        registry.handle(AdapterEvent::StateChanged(state)).unwrap();
    }

    assert_eq!(count(&registry, &Command::StartScan), 3);
    assert_eq!(count(&registry, &Command::StopScan), 2);
    assert_eq!(registry.phase(), RadioPhase::Scanning);
}

#[test]
fn every_not_ready_state_waits_for_power() {
    for state in [
        PowerState::PoweredOff,
        PowerState::Resetting,
        PowerState::Unauthorized,
        PowerState::Unknown,
        PowerState::Unsupported,
    ] {
        let mut registry = started(RegistryConfig::default());
        registry.handle(AdapterEvent::StateChanged(state)).unwrap();

        assert_eq!(registry.radio_state(), "Waiting for Bluetooth PowerOn...");
        assert_eq!(commands(&registry), &[Command::StopScan]);
    }
}

#[test]
fn unrecognized_state_shows_unknown_phase_without_commands() {
    let mut registry = started(RegistryConfig::default());
    let seen = observe(&mut registry);

    registry
        .handle(AdapterEvent::StateChanged(PowerState::Unrecognized(9)))
        .unwrap();

    assert_eq!(registry.radio_state(), "<unknown state>");
    assert!(commands(&registry).is_empty());
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn discovery_creates_device_and_connects_once() {
    let mut registry = started(RegistryConfig::default());

    registry.handle(discovered("abc", Some("Widget"))).unwrap();

    let device = registry.device(&"abc".into()).unwrap();
    assert_eq!(device.name(), Some("Widget"));
    assert_eq!(device.state().label(), "Connecting...");
    assert!(device.services().is_empty());
    assert_eq!(count(&registry, &Command::Connect("abc".into())), 1);
}

#[test]
fn devices_keep_first_discovered_order() {
    let mut registry = started(RegistryConfig::default());

    for id in ["m", "z", "a", "z", "q", "m"] {
        registry.handle(discovered(id, None)).unwrap();
    }

    let ids: Vec<_> = registry
        .devices()
        .iter()
        .map(|device| device.id().as_str().to_string())
        .collect();
    assert_eq!(ids, ["m", "z", "a", "q"]);
}

#[test]
fn connect_success_starts_service_discovery() {
    let mut registry = started(RegistryConfig::default());

    registry.handle(discovered("abc", Some("Widget"))).unwrap();
    registry.handle(connected("abc")).unwrap();

    assert_eq!(state_of(&registry, "abc").label(), "Connected");
    assert_eq!(
        commands(&registry),
        &[
            Command::Connect("abc".into()),
            Command::DiscoverServices("abc".into())
        ]
    );
}

#[test]
fn connect_failure_is_terminal() {
    let mut registry = started(RegistryConfig::default());

    registry.handle(discovered("abc", None)).unwrap();
    registry.handle(connect_failed("abc")).unwrap();
    registry.handle(connected("abc")).unwrap();
    registry.handle(disconnected("abc")).unwrap();

    assert_eq!(state_of(&registry, "abc"), ConnectionState::FailedToConnect);
    assert_eq!(state_of(&registry, "abc").label(), "Failed to connect");
    assert_eq!(commands(&registry), &[Command::Connect("abc".into())]);
}

#[test]
fn only_forward_transitions_are_reachable() {
    let mut registry = started(RegistryConfig::default());
    let seen = observe(&mut registry);

    registry.handle(discovered("abc", None)).unwrap();
    // Not connected yet.
    registry.handle(disconnected("abc")).unwrap();
    assert_eq!(state_of(&registry, "abc"), ConnectionState::Connecting);

    registry.handle(connected("abc")).unwrap();
    registry.handle(connect_failed("abc")).unwrap();
    registry.handle(connected("abc")).unwrap();
    assert_eq!(state_of(&registry, "abc"), ConnectionState::Connected);

    registry.handle(disconnected("abc")).unwrap();
    registry.handle(connected("abc")).unwrap();
    assert_eq!(state_of(&registry, "abc"), ConnectionState::Disconnected);

    // discovered, connected, disconnected
    assert_eq!(seen.lock().unwrap().len(), 3);
    assert_eq!(count(&registry, &Command::DiscoverServices("abc".into())), 1);
}

#[test]
fn services_are_appended_in_arrival_order() {
    let mut registry = started(RegistryConfig::default());

    registry.handle(discovered("abc", None)).unwrap();
    registry.handle(connected("abc")).unwrap();
    registry
        .handle(AdapterEvent::ServicesDiscovered {
            id: "abc".into(),
            services: vec![services::HEART_RATE, services::BATTERY],
        })
        .unwrap();

    let device = registry.device(&"abc".into()).unwrap();
    let names: Vec<_> = device.services().iter().map(|s| s.name()).collect();
    assert_eq!(names, ["Heart Rate", "Battery Service"]);
    assert!(device
        .services()
        .iter()
        .all(|service| service.characteristics().is_empty()));
}

#[test]
fn characteristics_attach_to_their_service() {
    let mut registry = started(RegistryConfig::default());

    registry.handle(discovered("abc", None)).unwrap();
    registry.handle(connected("abc")).unwrap();
    registry
        .handle(AdapterEvent::ServicesDiscovered {
            id: "abc".into(),
            services: vec![services::DEVICE_INFORMATION, services::BATTERY],
        })
        .unwrap();
    registry
        .handle(AdapterEvent::CharacteristicsDiscovered {
            id: "abc".into(),
            service: services::BATTERY,
            characteristics: vec![characteristics::BATTERY_LEVEL],
        })
        .unwrap();
    registry
        .handle(AdapterEvent::CharacteristicsDiscovered {
            id: "abc".into(),
            service: services::DEVICE_INFORMATION,
            characteristics: vec![
                characteristics::MANUFACTURER_NAME,
                characteristics::MODEL_NUMBER,
            ],
        })
        .unwrap();

    let device = registry.device(&"abc".into()).unwrap();
    let info: Vec<_> = device.services()[0]
        .characteristics()
        .iter()
        .map(|c| c.name())
        .collect();
    assert_eq!(info, ["Manufacturer Name String", "Model Number String"]);
    assert_eq!(
        device.services()[1].characteristics()[0].uuid(),
        characteristics::BATTERY_LEVEL
    );
    assert_eq!(device.characteristic_count(), 3);
}

#[test]
fn rediscovered_services_are_appended_not_replaced() {
    let mut registry = started(RegistryConfig::default());

    registry.handle(discovered("abc", None)).unwrap();
    registry.handle(connected("abc")).unwrap();

    for _ in 0..2 {
        registry
            .handle(AdapterEvent::ServicesDiscovered {
                id: "abc".into(),
                services: vec![services::BATTERY],
            })
            .unwrap();
        registry
            .handle(AdapterEvent::CharacteristicsDiscovered {
                id: "abc".into(),
                service: services::BATTERY,
                characteristics: vec![characteristics::BATTERY_LEVEL],
            })
            .unwrap();
    }

    let device = registry.device(&"abc".into()).unwrap();
    assert_eq!(device.services().len(), 2);
    assert_eq!(device.services()[0].characteristics().len(), 1);
    assert_eq!(device.services()[1].characteristics().len(), 1);
}

#[test]
fn appends_never_shrink_or_reorder() {
    let mut registry = started(RegistryConfig::default());
    registry.handle(discovered("abc", None)).unwrap();
    registry.handle(connected("abc")).unwrap();

    let batches = [
        vec![services::GENERIC_ACCESS],
        vec![],
        vec![services::BATTERY, services::HEART_RATE],
        vec![services::GENERIC_ACCESS],
    ];

    let mut previous = Vec::new();
    for batch in batches {
        registry
            .handle(AdapterEvent::ServicesDiscovered {
                id: "abc".into(),
                services: batch,
            })
            .unwrap();

        let current = registry.device(&"abc".into()).unwrap().services().to_vec();
        assert!(current.len() >= previous.len());
        assert_eq!(&current[..previous.len()], &previous[..]);
        previous = current;
    }
    assert_eq!(previous.len(), 4);
}

#[test]
fn disconnect_keeps_discovered_services() {
    let mut registry = started(RegistryConfig::default());

    registry.handle(discovered("abc", Some("Widget"))).unwrap();
    registry.handle(connected("abc")).unwrap();
    registry
        .handle(AdapterEvent::ServicesDiscovered {
            id: "abc".into(),
            services: vec![services::BATTERY],
        })
        .unwrap();
    registry
        .handle(AdapterEvent::CharacteristicsDiscovered {
            id: "abc".into(),
            service: services::BATTERY,
            characteristics: vec![characteristics::BATTERY_LEVEL],
        })
        .unwrap();
    let before = registry.device(&"abc".into()).unwrap().services().to_vec();

    registry.handle(disconnected("abc")).unwrap();

    let device = registry.device(&"abc".into()).unwrap();
    assert_eq!(device.state().label(), "Disconnected");
    assert_eq!(device.services(), &before[..]);
}

#[test]
fn each_mutation_notifies_once_after_it_is_visible() {
    let mut registry = started(RegistryConfig::default());
    let seen = observe(&mut registry);

    registry
        .handle(AdapterEvent::StateChanged(PowerState::PoweredOn))
        .unwrap();
    registry.handle(discovered("a", None)).unwrap();
    registry.handle(discovered("b", None)).unwrap();
    registry.handle(connected("a")).unwrap();
    registry
        .handle(AdapterEvent::ServicesDiscovered {
            id: "a".into(),
            services: vec![services::BATTERY],
        })
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), [0, 1, 2, 2, 2]);
}

#[test]
fn listeners_see_the_new_state() {
    let mut registry = started(RegistryConfig::default());
    let labels = Arc::new(Mutex::new(Vec::new()));
    let sink = labels.clone();
    registry.on_changed(move |view| {
        let state = view.devices().first().map(|d| d.state().label());
        sink.lock().unwrap().push((view.radio_state(), state));
    });

    registry
        .handle(AdapterEvent::StateChanged(PowerState::PoweredOn))
        .unwrap();
    registry.handle(discovered("a", None)).unwrap();
    registry.handle(connected("a")).unwrap();

    assert_eq!(
        *labels.lock().unwrap(),
        [
            ("Scanning...", None),
            ("Scanning...", Some("Connecting...")),
            ("Scanning...", Some("Connected")),
        ]
    );
}

#[test]
fn listeners_run_in_registration_order() {
    let mut registry = started(RegistryConfig::default());
    let order = Arc::new(Mutex::new(Vec::new()));

    for n in 0..3 {
        let order = order.clone();
        registry.on_changed(move |_| order.lock().unwrap().push(n));
    }

    registry.handle(discovered("a", None)).unwrap();
    registry.handle(discovered("b", None)).unwrap();

    assert_eq!(*order.lock().unwrap(), [0, 1, 2, 0, 1, 2]);
}

#[test]
fn starting_twice_fails_and_keeps_state() {
    let mut registry = started(RegistryConfig::default());
    registry
        .handle(AdapterEvent::StateChanged(PowerState::PoweredOn))
        .unwrap();
    registry.handle(discovered("abc", None)).unwrap();
    let before = registry.snapshot();

    let result = registry.start(RecordingAdapter::default());

    assert!(matches!(result, Err(Error::AlreadyStarted)));
    assert_eq!(registry.snapshot(), before);
    // The first adapter is still in use.
    assert_eq!(commands(&registry).len(), 2);
}

#[test]
fn events_for_unknown_peripherals_are_rejected() {
    let mut registry = started(RegistryConfig::default());
    let seen = observe(&mut registry);
    registry.handle(discovered("abc", None)).unwrap();

    for event in [
        connected("nope"),
        connect_failed("nope"),
        disconnected("nope"),
        AdapterEvent::ServicesDiscovered {
            id: "nope".into(),
            services: vec![services::BATTERY],
        },
        AdapterEvent::CharacteristicsDiscovered {
            id: "nope".into(),
            service: services::BATTERY,
            characteristics: vec![],
        },
    ] {
        match registry.handle(event) {
            Err(Error::UnknownPeripheral(id)) => assert_eq!(id.as_str(), "nope"),
            other => panic!("expected UnknownPeripheral, got {:?}", other),
        }
    }

    assert_eq!(registry.devices().len(), 1);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn characteristics_for_unknown_service_are_rejected() {
    let mut registry = started(RegistryConfig::default());
    registry.handle(discovered("abc", None)).unwrap();
    registry.handle(connected("abc")).unwrap();

    let result = registry.handle(AdapterEvent::CharacteristicsDiscovered {
        id: "abc".into(),
        service: services::HEART_RATE,
        characteristics: vec![characteristics::HEART_RATE_MEASUREMENT],
    });

    match result {
        Err(Error::UnknownService { id, service }) => {
            assert_eq!(id.as_str(), "abc");
            assert_eq!(service, services::HEART_RATE);
        }
        other => panic!("expected UnknownService, got {:?}", other),
    }
}

#[test]
fn rediscovery_is_ignored_by_default() {
    let mut registry = started(RegistryConfig::default());
    let seen = observe(&mut registry);

    registry.handle(discovered("abc", Some("Widget"))).unwrap();
    registry.handle(discovered("abc", Some("Renamed"))).unwrap();
    registry.handle(connected("abc")).unwrap();
    registry.handle(disconnected("abc")).unwrap();
    registry.handle(discovered("abc", Some("Renamed"))).unwrap();

    let device = registry.device(&"abc".into()).unwrap();
    assert_eq!(device.name(), Some("Widget"));
    assert_eq!(device.state(), ConnectionState::Disconnected);
    assert_eq!(count(&registry, &Command::Connect("abc".into())), 1);
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[test]
fn rediscovery_reconnects_after_the_connection_ended() {
    let mut registry = started(RegistryConfig::default().reconnect_on_rediscovery());

    registry.handle(discovered("abc", Some("Widget"))).unwrap();
    // Still connecting, nothing to restart.
    registry.handle(discovered("abc", None)).unwrap();
    assert_eq!(count(&registry, &Command::Connect("abc".into())), 1);

    registry.handle(connected("abc")).unwrap();
    registry
        .handle(AdapterEvent::ServicesDiscovered {
            id: "abc".into(),
            services: vec![services::BATTERY],
        })
        .unwrap();
    registry.handle(disconnected("abc")).unwrap();

    registry.handle(discovered("abc", Some("Widget 2"))).unwrap();

    let device = registry.device(&"abc".into()).unwrap();
    assert_eq!(device.state(), ConnectionState::Connecting);
    assert_eq!(device.name(), Some("Widget 2"));
    assert_eq!(device.services().len(), 1);
    assert_eq!(count(&registry, &Command::Connect("abc".into())), 2);
    assert_eq!(registry.devices().len(), 1);
}

#[test]
fn rediscovery_reconnects_after_a_failed_attempt() {
    let mut registry = started(RegistryConfig::default().reconnect_on_rediscovery());

    registry.handle(discovered("abc", Some("Widget"))).unwrap();
    registry.handle(connect_failed("abc")).unwrap();
    registry.handle(discovered("abc", None)).unwrap();
    registry.handle(connected("abc")).unwrap();

    let device = registry.device(&"abc".into()).unwrap();
    assert_eq!(device.state(), ConnectionState::Connected);
    assert_eq!(device.name(), Some("Widget"));
    assert_eq!(count(&registry, &Command::Connect("abc".into())), 2);
}

#[tokio::test]
async fn run_stops_at_the_first_contract_violation() {
    let mut registry = started(RegistryConfig::default());

    let events = futures::stream::iter(vec![
        AdapterEvent::StateChanged(PowerState::PoweredOn),
        discovered("abc", None),
        connected("ghost"),
        connected("abc"),
    ]);

    let result = registry.run(events).await;

    assert!(matches!(result, Err(Error::UnknownPeripheral(_))));
    assert_eq!(state_of(&registry, "abc"), ConnectionState::Connecting);
}

#[tokio::test]
async fn run_applies_events_until_the_stream_ends() {
    let mut registry = started(RegistryConfig::default());
    let seen = observe(&mut registry);

    let events = futures::stream::iter(vec![
        AdapterEvent::StateChanged(PowerState::PoweredOn),
        discovered("abc", Some("Widget")),
        connected("abc"),
        disconnected("abc"),
    ]);

    registry.run(events).await.unwrap();

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.radio_state(), "Scanning...");
    assert_eq!(
        snapshot.device(&"abc".into()).unwrap().state(),
        ConnectionState::Disconnected
    );
    assert_eq!(seen.lock().unwrap().len(), 4);
}
