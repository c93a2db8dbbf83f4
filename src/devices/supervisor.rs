//! Controller supervisor: owns every connector and protocol engine, loads
//! the backplane description at startup and runs the service loop.
//!
//! Interrupt handlers never touch controller state. They only push
//! `IngressEvent`s into a single producer, single consumer queue whose
//! consumer end lives here.
use super::{
    backplane::{
        codec, BackplaneConfig, ControllerFeatures, Parameters, Route, TwoWireResetOperation, MAX_DFC, MAX_HFC,
    },
    change::ChangeAggregator,
    config_store::{ConfigStore, Key},
    connector::{Connector, DfcState, Policy},
    protocol::{Context, Engine},
    signals::{HfcLines, Sampler, SignalDriver, DEFAULT_DEBOUNCE},
    traits::{Bus, Flash},
};
use crate::{
    error::{Error, Kind},
    hal::{time::Now, watchdog::Watchdog},
};
use heapless::{spsc::Consumer, Vec};
use nb::block;

pub const EVENT_QUEUE_SIZE: usize = 16;

/// Written to the image trailer once the running image is known good.
pub const IMAGE_OK: u8 = 0x01;

/// Wake up reasons posted by interrupt handlers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub enum IngressEvent {
    SignalChange,
    BusActivity(u8),
    Tick,
}

/// Host readable controller health.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct ControllerStatus {
    /// The stored configuration was unusable; factory defaults are active.
    pub config_corrupt: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub enum BootConfirmation {
    Confirmed,
    AlreadySet,
}

pub struct Supervisor<'q, S, F, T, B>
where
    S: SignalDriver,
    F: Flash,
    T: Now,
    B: Bus,
{
    signals: S,
    sampler: Sampler<T::I>,
    store: ConfigStore<F>,
    clock: T,
    engines: Vec<(B, Engine), MAX_HFC>,
    connectors: Vec<Connector<T::I>, MAX_DFC>,
    aggregator: ChangeAggregator,
    config: BackplaneConfig,
    features: ControllerFeatures,
    status: ControllerStatus,
    events: Consumer<'q, IngressEvent, EVENT_QUEUE_SIZE>,
    two_wire_reset: Vec<bool, MAX_HFC>,
}

impl<'q, S, F, T, B> Supervisor<'q, S, F, T, B>
where
    S: SignalDriver,
    F: Flash,
    T: Now,
    B: Bus,
{
    /// Brings the controller up. Any error returned here is fatal, and the
    /// change detect line is left asserted before returning it.
    pub fn new(
        mut signals: S,
        store: ConfigStore<F>,
        clock: T,
        buses: impl IntoIterator<Item = B>,
        factory: BackplaneConfig,
        events: Consumer<'q, IngressEvent, EVENT_QUEUE_SIZE>,
    ) -> Result<Self, Error> {
        match Self::initialize(&signals, store, clock, buses, factory, events) {
            Ok(parts) => Ok(parts.assemble(signals)),
            Err(e) => {
                Self::raise_fault(&mut signals);
                Err(e)
            }
        }
    }

    fn initialize(
        signals: &S,
        mut store: ConfigStore<F>,
        clock: T,
        buses: impl IntoIterator<Item = B>,
        factory: BackplaneConfig,
        events: Consumer<'q, IngressEvent, EVENT_QUEUE_SIZE>,
    ) -> Result<Parts<'q, F, T, B>, Error> {
        let (config, backplane_corrupt) = load_backplane(&mut store, factory)?;
        let (features, features_corrupt) = load_features(&mut store, &config);
        let status = ControllerStatus { config_corrupt: backplane_corrupt || features_corrupt };

        let mut engines = Vec::new();
        for (hfc, bus) in buses.into_iter().enumerate() {
            engines.push((bus, Engine::new(hfc as u8))).map_err(|_| Error::TooManyConnectors)?;
        }
        check_board(signals, engines.len(), &config)?;

        let sampler = Sampler::new(config.num_of_dfc(), config.num_of_hfc(), DEFAULT_DEBOUNCE)?;
        let idle_hosts = [HfcLines::default(); MAX_HFC];
        let mut connectors = Vec::new();
        for dfc in 0..config.num_of_dfc() as u8 {
            let policy = policy(&config, &features, &idle_hosts, dfc);
            connectors.push(Connector::new(dfc, policy)).map_err(|_| Error::TooManyConnectors)?;
        }
        let two_wire_reset = (0..config.num_of_hfc()).map(|_| false).collect();

        info!(
            "Controller up: {} HFCs, {} DFCs, {} routes",
            config.num_of_hfc(),
            config.num_of_dfc(),
            config.routes.len()
        );
        Ok(Parts {
            sampler,
            store,
            clock,
            engines,
            connectors,
            config,
            features,
            status,
            events,
            two_wire_reset,
        })
    }

    pub fn config(&self) -> &BackplaneConfig { &self.config }
    pub fn features(&self) -> &ControllerFeatures { &self.features }
    pub fn status(&self) -> ControllerStatus { self.status }
    pub fn aggregator(&self) -> &ChangeAggregator { &self.aggregator }
    pub fn connector(&self, dfc: usize) -> Option<&DfcState> { self.connectors.get(dfc).map(Connector::state) }

    /// One pass of the service loop. Only the work the drained events
    /// call for is done: a `Tick` samples every line and services every
    /// bus, a `SignalChange` samples, and `BusActivity` services that bus.
    /// An empty queue leaves the controller untouched.
    pub fn service(&mut self) -> Result<(), Error> {
        let pending = self.drain_events();
        if pending.is_idle() {
            return Ok(());
        }

        let now = self.clock.now();
        if pending.sample {
            self.sample(now);
        }

        for (hfc, (bus, engine)) in self.engines.iter_mut().enumerate() {
            if !pending.buses[hfc] {
                continue;
            }
            let mut context = Context {
                config: &self.config,
                features: &mut self.features,
                connectors: &mut self.connectors,
                aggregator: &mut self.aggregator,
                store: &mut self.store,
                config_corrupt: self.status.config_corrupt,
                now,
            };
            if let Err(e) = engine.service(bus, &mut context) {
                e.report();
            }
        }

        self.drive_outputs()
    }

    fn drain_events(&mut self) -> Pending {
        let mut pending = Pending::default();
        while let Some(event) = self.events.dequeue() {
            match event {
                IngressEvent::Tick => {
                    pending.sample = true;
                    pending.buses = [true; MAX_HFC];
                }
                IngressEvent::SignalChange => pending.sample = true,
                IngressEvent::BusActivity(hfc) => match pending.buses.get_mut(hfc as usize) {
                    Some(bus) => *bus = true,
                    None => warn!("Bus activity reported for unknown HFC {}", hfc),
                },
            }
        }
        pending
    }

    fn sample(&mut self, now: T::I) {
        let snapshot = self.sampler.sample(&self.signals, now);

        let resets_engine =
            self.config.capabilities().i2c_reset_operation != TwoWireResetOperation::NotSupported;
        for (hfc, lines) in snapshot.hfc.iter().enumerate() {
            let asserted_now = lines.two_wire_reset && !self.two_wire_reset[hfc];
            if asserted_now && resets_engine {
                if let Some((bus, engine)) = self.engines.get_mut(hfc) {
                    engine.reset(bus);
                }
            }
            self.two_wire_reset[hfc] = lines.two_wire_reset;
        }

        for (dfc, connector) in self.connectors.iter_mut().enumerate() {
            let policy = policy(&self.config, &self.features, &snapshot.hfc, dfc as u8);
            let changed = connector.step(snapshot.dfc[dfc], policy, now);
            if self.aggregator.register(changed, &self.features) {
                connector.count_change();
            }
        }
    }

    /// Runs the service loop forever. A fatal fault parks the controller
    /// with the change detect line asserted.
    pub fn run(mut self) -> ! {
        loop {
            match self.service() {
                Ok(()) => (),
                Err(e) if e.is_fatal() => self.halt(e),
                Err(e) => e.report(),
            }
            if !self.events.ready() {
                wait_for_event();
            }
        }
    }

    /// Validates and stores a new backplane description. Takes effect on
    /// the next start, so a table this board could not start with is
    /// refused rather than stored.
    pub fn reprovision(&mut self, parameters: Parameters, routes: &[Route]) -> Result<(), Error> {
        let config = BackplaneConfig::new(parameters, routes)?;
        check_board(&self.signals, self.engines.len(), &config)?;
        let mut buffer = [0u8; codec::MAX_ENCODED_SIZE];
        let size = codec::encode(&config, &mut buffer)?;
        self.store.write(Key::Backplane, &buffer[..size])?;
        info!("Backplane reprovisioned with {} routes, effective on next start", config.routes.len());
        Ok(())
    }

    fn drive_outputs(&mut self) -> Result<(), Error> {
        let capabilities = *self.config.capabilities();
        for (dfc, connector) in self.connectors.iter().enumerate() {
            let dual = self.config.routes.has_secondary(dfc as u8);
            self.signals.drive_dfc(dfc, connector.outputs(&capabilities, dual))?;
        }

        let any_installed = self.connectors.iter().any(Connector::is_installed);
        let asserted = capabilities.change_detect_interrupt
            && self.aggregator.change_detect_asserted(any_installed, &self.features);
        for hfc in 0..self.engines.len() {
            self.signals.drive_change_detect(hfc, asserted)?;
        }
        Ok(())
    }

    fn raise_fault(signals: &mut S) {
        for hfc in 0..signals.hfc_count() {
            if let Err(e) = signals.drive_change_detect(hfc, true) {
                e.report();
            }
        }
    }

    fn halt(&mut self, error: Error) -> ! {
        error.report();
        Self::raise_fault(&mut self.signals);
        loop {
            core::hint::spin_loop();
        }
    }
}

/// Work requested by the events drained in one pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct Pending {
    sample: bool,
    buses: [bool; MAX_HFC],
}

impl Pending {
    fn is_idle(&self) -> bool { !self.sample && !self.buses.iter().any(|&bus| bus) }
}

/// Sleeps until the next interrupt.
fn wait_for_event() {
    #[cfg(target_arch = "arm")]
    cortex_m::asm::wfi();
    #[cfg(not(target_arch = "arm"))]
    core::hint::spin_loop();
}

/// A backplane table is only usable if this board has a signal set for
/// every connector it names and a bus for every host facing connector.
fn check_board<S: SignalDriver>(signals: &S, buses: usize, config: &BackplaneConfig) -> Result<(), Error> {
    if signals.dfc_count() != config.num_of_dfc() || signals.hfc_count() != config.num_of_hfc() {
        return Err(Error::ConfigurationError("Signal driver doesn't match the backplane"));
    }
    if buses != config.num_of_hfc() {
        return Err(Error::ConfigurationError("One host bus per HFC required"));
    }
    Ok(())
}

/// Everything but the signal driver, so a failed start can still use it.
struct Parts<'q, F: Flash, T: Now, B: Bus> {
    sampler: Sampler<T::I>,
    store: ConfigStore<F>,
    clock: T,
    engines: Vec<(B, Engine), MAX_HFC>,
    connectors: Vec<Connector<T::I>, MAX_DFC>,
    config: BackplaneConfig,
    features: ControllerFeatures,
    status: ControllerStatus,
    events: Consumer<'q, IngressEvent, EVENT_QUEUE_SIZE>,
    two_wire_reset: Vec<bool, MAX_HFC>,
}

impl<'q, F: Flash, T: Now, B: Bus> Parts<'q, F, T, B> {
    fn assemble<S: SignalDriver>(self, signals: S) -> Supervisor<'q, S, F, T, B> {
        Supervisor {
            signals,
            sampler: self.sampler,
            store: self.store,
            clock: self.clock,
            engines: self.engines,
            connectors: self.connectors,
            aggregator: ChangeAggregator::new(),
            config: self.config,
            features: self.features,
            status: self.status,
            events: self.events,
            two_wire_reset: self.two_wire_reset,
        }
    }
}

fn policy(config: &BackplaneConfig, features: &ControllerFeatures, hosts: &[HfcLines], dfc: u8) -> Policy {
    let host_perst = config
        .routes
        .hfcs_for(dfc)
        .any(|hfc| hosts.get(hfc as usize).map_or(false, |lines| lines.perst));
    Policy {
        settle_time: config.settle_time(),
        perst_override: features.perst_management_override,
        host_perst,
    }
}

/// Stored backplane, or the factory table. Returns whether the stored copy
/// was unusable. A stored table that decodes but fails validation is fatal.
fn load_backplane<F: Flash>(
    store: &mut ConfigStore<F>,
    factory: BackplaneConfig,
) -> Result<(BackplaneConfig, bool), Error> {
    let mut buffer = [0u8; codec::MAX_ENCODED_SIZE];
    match store.read(Key::Backplane, &mut buffer).and_then(|size| codec::decode(&buffer[..size])) {
        Ok(config) => Ok((config, false)),
        Err(Error::RecordNotFound) => {
            info!("No stored backplane, provisioning the factory table");
            let size = codec::encode(&factory, &mut buffer)?;
            if let Err(e) = store.write(Key::Backplane, &buffer[..size]) {
                e.report();
            }
            Ok((factory, false))
        }
        Err(e) if e.kind() == Kind::FatalInitFault => Err(e),
        Err(e) => {
            warn!("Stored backplane unusable ({:?}), falling back to factory defaults", e);
            Ok((factory, true))
        }
    }
}

/// Stored features, or the factory ones from the backplane table.
fn load_features<F: Flash>(store: &mut ConfigStore<F>, config: &BackplaneConfig) -> (ControllerFeatures, bool) {
    let mut buffer = [0u8; codec::FEATURES_SIZE];
    match store.read(Key::Features, &mut buffer).and_then(|size| codec::decode_features(&buffer[..size])) {
        Ok(features) => (features, false),
        Err(Error::RecordNotFound) => (config.factory_features(), false),
        Err(e) => {
            warn!("Stored features unusable ({:?}), falling back to factory defaults", e);
            (config.factory_features(), true)
        }
    }
}

/// Marks the running image as good so the boot library won't revert it.
/// The watchdog armed by the bootloader is released first.
pub fn confirm_boot<W: Watchdog, F: Flash>(
    watchdog: &mut W,
    flash: &mut F,
    image_ok_address: F::Address,
) -> Result<BootConfirmation, Error> {
    watchdog.kick();
    watchdog.release();

    let mut flag = [0u8; 1];
    block!(flash.read(image_ok_address, &mut flag))?;
    if flag[0] == IMAGE_OK {
        return Ok(BootConfirmation::AlreadySet);
    }

    block!(flash.write(image_ok_address, &[IMAGE_OK]))?;
    block!(flash.read(image_ok_address, &mut flag))?;
    if flag[0] != IMAGE_OK {
        return Err(Error::WriteVerifyFailed);
    }
    info!("Running image confirmed");
    Ok(BootConfirmation::Confirmed)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        devices::{
            backplane::{test_support::*, Domain},
            connector::OperationalState,
            protocol::frame::{checksum, write_address},
            signals::{doubles::FakeSignals, DriveType},
        },
        hal::doubles::{
            flash::{Address, FakeFlash},
            time::FakeClock,
            two_wire::FakeTwoWire,
            watchdog::FakeWatchdog,
        },
    };
    use core::ops::{Deref, DerefMut};
    use heapless::spsc::{Producer, Queue};

    const BASE: Address = Address(0x1005_C000);
    const SLOT_SIZE: usize = 512;
    const SLOTS: usize = 4;
    const ADDRESS: u8 = 0x60;

    type TestSupervisor<'q> = Supervisor<'q, FakeSignals, FakeFlash, FakeClock, FakeTwoWire>;

    /// A supervisor together with the interrupt side of its event queue.
    struct Rig<'q> {
        controller: TestSupervisor<'q>,
        events: Producer<'q, IngressEvent, EVENT_QUEUE_SIZE>,
    }

    impl<'q> Deref for Rig<'q> {
        type Target = TestSupervisor<'q>;
        fn deref(&self) -> &Self::Target { &self.controller }
    }

    impl<'q> DerefMut for Rig<'q> {
        fn deref_mut(&mut self) -> &mut Self::Target { &mut self.controller }
    }

    fn store() -> ConfigStore<FakeFlash> {
        ConfigStore::new(FakeFlash::new(BASE, SLOT_SIZE * SLOTS), BASE, SLOT_SIZE, SLOTS).unwrap()
    }

    fn buses() -> [FakeTwoWire; 2] { [FakeTwoWire::new(ADDRESS), FakeTwoWire::new(ADDRESS)] }

    fn supervisor<'q>(
        signals: &FakeSignals,
        clock: &FakeClock,
        store: ConfigStore<FakeFlash>,
        queue: &'q mut Queue<IngressEvent, EVENT_QUEUE_SIZE>,
    ) -> Result<Rig<'q>, Error> {
        let _ = env_logger::builder().is_test(true).try_init();
        let (events, consumer) = queue.split();
        let controller = Supervisor::new(signals.clone(), store, clock.clone(), buses(), backplane(), consumer)?;
        Ok(Rig { controller, events })
    }

    impl<'q> Rig<'q> {
        fn bus(&mut self, hfc: usize) -> &mut FakeTwoWire { &mut self.controller.engines[hfc].0 }

        fn post(&mut self, event: IngressEvent) { self.events.enqueue(event).unwrap() }

        /// Ticks and services every millisecond for `milliseconds`.
        fn run_for(&mut self, clock: &FakeClock, milliseconds: u32) {
            for _ in 0..milliseconds {
                clock.advance(1);
                self.post(IngressEvent::Tick);
                self.service().unwrap();
            }
        }

        fn transact(&mut self, hfc: usize, body: &[u8]) -> std::vec::Vec<u8> {
            let mut frame = body.to_vec();
            frame.push(checksum(write_address(ADDRESS), body));
            self.bus(hfc).host_writes(&frame);
            self.post(IngressEvent::BusActivity(hfc as u8));
            self.service().unwrap();
            self.bus(hfc).last_response().unwrap().to_vec()
        }
    }

    #[test]
    fn duplicate_stored_routes_are_a_fatal_init_fault() {
        // Given
        let mut store = store();
        let mut routes = routes().to_vec();
        routes.push(route(0, 2, Domain::Primary));
        let mut buffer = [0u8; codec::MAX_ENCODED_SIZE];
        let size = codec::encode_parts(&parameters(), routes.iter(), &mut buffer).unwrap();
        store.write(Key::Backplane, &buffer[..size]).unwrap();
        let (signals, clock) = (FakeSignals::new(4, 2), FakeClock::default());
        let mut queue = Queue::new();

        // When
        let result = supervisor(&signals, &clock, store, &mut queue);

        // Then
        let error = result.err().unwrap();
        assert_eq!(Error::DuplicateRoute, error);
        assert_eq!(Kind::FatalInitFault, error.kind());
        assert!(signals.change_detect(0));
        assert!(signals.change_detect(1));
    }

    #[test]
    fn missing_backplane_is_provisioned_from_factory() {
        let (signals, clock) = (FakeSignals::new(4, 2), FakeClock::default());
        let mut queue = Queue::new();
        let supervisor = supervisor(&signals, &clock, store(), &mut queue).unwrap();
        assert!(!supervisor.status().config_corrupt);
        assert_eq!(&backplane(), supervisor.config());

        let mut store = supervisor.controller.store;
        let mut buffer = [0u8; codec::MAX_ENCODED_SIZE];
        let size = store.read(Key::Backplane, &mut buffer).unwrap();
        assert_eq!(Ok(backplane()), codec::decode(&buffer[..size]));
    }

    #[test]
    fn corrupt_backplane_falls_back_to_factory_with_fault_flag() {
        // Given
        let mut store = store();
        store.write(Key::Backplane, &[0xEE; 40]).unwrap();
        let (signals, clock) = (FakeSignals::new(4, 2), FakeClock::default());
        let mut queue = Queue::new();

        // When
        let mut supervisor = supervisor(&signals, &clock, store, &mut queue).unwrap();
        let response = supervisor.transact(0, &[0x00]);

        // Then
        assert!(supervisor.status().config_corrupt);
        assert_eq!(&backplane(), supervisor.config());
        assert_eq!(&[0x01, 0x01, 0b11], &response[..3]);
    }

    #[test]
    fn stored_features_override_factory_ones() {
        let mut store = store();
        let mut features = features();
        features.cprsnt_legacy_mode = true;
        store.write(Key::Features, &codec::encode_features(&features)).unwrap();
        let (signals, clock) = (FakeSignals::new(4, 2), FakeClock::default());
        let mut queue = Queue::new();

        let supervisor = supervisor(&signals, &clock, store, &mut queue).unwrap();
        assert!(supervisor.features().cprsnt_legacy_mode);
    }

    #[test]
    fn mismatched_signal_driver_is_refused() {
        let (signals, clock) = (FakeSignals::new(3, 2), FakeClock::default());
        let mut queue = Queue::new();
        let result = supervisor(&signals, &clock, store(), &mut queue);
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[test]
    fn installed_drive_counts_once_and_survives_a_host_clear() {
        // Given
        let (signals, clock) = (FakeSignals::new(4, 2), FakeClock::default());
        let mut queue = Queue::new();
        let mut supervisor = supervisor(&signals, &clock, store(), &mut queue).unwrap();

        // When
        signals.insert(2, DriveType::SasSata);
        supervisor.run_for(&clock, 10 + 400);
        let settling = *supervisor.connector(2).unwrap();
        supervisor.run_for(&clock, 1);

        // Then
        assert_eq!(OperationalState::Detected, settling.operational_state);
        let installed = supervisor.connector(2).unwrap();
        assert_eq!(OperationalState::Installed, installed.operational_state);
        assert_eq!(Some(DriveType::SasSata), installed.drive_type_detected);
        assert_eq!(1, supervisor.aggregator().count());
        assert!(signals.change_detect(0));
        assert!(!signals.outputs(2).perst_a);
        assert!(signals.outputs(2).refclk_en);

        // When the host clears the count
        let response = supervisor.transact(0, &[0x09, 0x00]);

        // Then
        assert_eq!(&[0x01, 0x02, 0x00, 0x00], &response[..4]);
        assert_eq!(0, supervisor.aggregator().count());
        assert!(supervisor.connector(2).unwrap().installed);
        assert!(!signals.change_detect(0));
    }

    #[test]
    fn bouncing_presence_never_installs() {
        let (signals, clock) = (FakeSignals::new(4, 2), FakeClock::default());
        let mut queue = Queue::new();
        let mut supervisor = supervisor(&signals, &clock, store(), &mut queue).unwrap();

        for _ in 0..100 {
            signals.insert(1, DriveType::QuadPcie);
            supervisor.run_for(&clock, 5);
            signals.remove(1);
            supervisor.run_for(&clock, 5);
        }

        assert_eq!(OperationalState::Empty, supervisor.connector(1).unwrap().operational_state);
        assert_eq!(0, supervisor.aggregator().count());
        assert!(!signals.change_detect(0));
    }

    #[test]
    fn faulted_lines_never_count() {
        let (signals, clock) = (FakeSignals::new(4, 2), FakeClock::default());
        let mut queue = Queue::new();
        let mut supervisor = supervisor(&signals, &clock, store(), &mut queue).unwrap();

        signals.unreadable(0, true);
        supervisor.run_for(&clock, 20);

        assert_eq!(OperationalState::Unknown, supervisor.connector(0).unwrap().operational_state);
        assert_eq!(0, supervisor.aggregator().count());
    }

    #[test]
    fn host_perst_reaches_every_routed_connector() {
        // Given: DFC 0 is wired to both hosts
        let (signals, clock) = (FakeSignals::new(4, 2), FakeClock::default());
        let mut queue = Queue::new();
        let mut supervisor = supervisor(&signals, &clock, store(), &mut queue).unwrap();
        signals.insert(0, DriveType::QuadPcie);
        signals.insert(1, DriveType::QuadPcie);
        supervisor.run_for(&clock, 500);
        assert!(!signals.outputs(0).perst_a);

        // When
        signals.host_perst(1, true);
        supervisor.run_for(&clock, 1);

        // Then
        assert!(signals.outputs(0).perst_a);
        assert!(!signals.outputs(1).perst_a);
        assert!(signals.outputs(0).dualport_en);
        assert!(!signals.outputs(1).dualport_en);
    }

    #[test]
    fn two_wire_reset_aborts_the_host_transaction() {
        let (signals, clock) = (FakeSignals::new(4, 2), FakeClock::default());
        let mut queue = Queue::new();
        let mut supervisor = supervisor(&signals, &clock, store(), &mut queue).unwrap();

        signals.two_wire_reset(1, true);
        supervisor.run_for(&clock, 3);

        assert_eq!(0, supervisor.bus(0).aborts);
        assert_eq!(1, supervisor.bus(1).aborts);
    }

    #[test]
    fn an_empty_event_queue_leaves_the_controller_idle() {
        // Given
        let (signals, clock) = (FakeSignals::new(4, 2), FakeClock::default());
        let mut queue = Queue::new();
        let mut supervisor = supervisor(&signals, &clock, store(), &mut queue).unwrap();
        signals.insert(2, DriveType::SasSata);
        supervisor.bus(0).host_writes(&[0x00, checksum(write_address(ADDRESS), &[0x00])]);

        // When
        for _ in 0..500 {
            clock.advance(1);
            supervisor.service().unwrap();
        }

        // Then
        assert_eq!(OperationalState::Empty, supervisor.connector(2).unwrap().operational_state);
        assert!(supervisor.bus(0).last_response().is_none());
    }

    #[test]
    fn bus_activity_only_services_the_bus_it_names() {
        // Given a frame pending on each bus
        let (signals, clock) = (FakeSignals::new(4, 2), FakeClock::default());
        let mut queue = Queue::new();
        let mut supervisor = supervisor(&signals, &clock, store(), &mut queue).unwrap();
        let frame = [0x00, checksum(write_address(ADDRESS), &[0x00])];
        supervisor.bus(0).host_writes(&frame);
        supervisor.bus(1).host_writes(&frame);

        // When
        supervisor.post(IngressEvent::BusActivity(1));
        supervisor.service().unwrap();

        // Then
        assert!(supervisor.bus(0).last_response().is_none());
        assert!(supervisor.bus(1).last_response().is_some());

        // When a signal change arrives, nothing is answered either
        supervisor.post(IngressEvent::SignalChange);
        supervisor.service().unwrap();
        assert!(supervisor.bus(0).last_response().is_none());

        // And a tick serves whatever is still pending
        supervisor.post(IngressEvent::Tick);
        supervisor.service().unwrap();
        assert!(supervisor.bus(0).last_response().is_some());
    }

    #[test]
    fn signal_changes_are_sampled_without_a_tick() {
        let (signals, clock) = (FakeSignals::new(4, 2), FakeClock::default());
        let mut queue = Queue::new();
        let mut supervisor = supervisor(&signals, &clock, store(), &mut queue).unwrap();

        signals.insert(1, DriveType::QuadPcie);
        for _ in 0..20 {
            clock.advance(1);
            supervisor.post(IngressEvent::SignalChange);
            supervisor.service().unwrap();
        }

        assert_eq!(OperationalState::Detected, supervisor.connector(1).unwrap().operational_state);
    }

    #[test]
    fn bus_activity_for_an_unknown_host_is_ignored() {
        let (signals, clock) = (FakeSignals::new(4, 2), FakeClock::default());
        let mut queue = Queue::new();
        let mut supervisor = supervisor(&signals, &clock, store(), &mut queue).unwrap();

        supervisor.post(IngressEvent::BusActivity(MAX_HFC as u8));
        assert_eq!(Ok(()), supervisor.service());
    }

    #[test]
    fn reprovisioned_backplane_applies_on_next_start() {
        // Given
        let (signals, clock) = (FakeSignals::new(4, 2), FakeClock::default());
        let mut queue = Queue::new();
        let mut supervisor = supervisor(&signals, &clock, store(), &mut queue).unwrap();
        let mut parameters = parameters();
        parameters.starting_slot = 20;

        // When
        supervisor.reprovision(parameters, &routes()).unwrap();
        let store = supervisor.controller.store;
        let mut queue = Queue::new();
        let restarted = self::supervisor(&signals, &clock, store, &mut queue).unwrap();

        // Then
        assert_eq!(20, restarted.config().parameters.starting_slot);
    }

    #[test]
    fn invalid_reprovisioning_is_refused() {
        let (signals, clock) = (FakeSignals::new(4, 2), FakeClock::default());
        let mut queue = Queue::new();
        let mut supervisor = supervisor(&signals, &clock, store(), &mut queue).unwrap();
        let routes = [route(0, 1, Domain::Primary), route(0, 1, Domain::Primary)];
        assert_eq!(Err(Error::DuplicateRoute), supervisor.reprovision(parameters(), &routes));
    }

    #[test]
    fn reprovisioning_for_another_board_is_refused() {
        // Given a table for three drive facing connectors on a four connector board
        let (signals, clock) = (FakeSignals::new(4, 2), FakeClock::default());
        let mut queue = Queue::new();
        let mut supervisor = supervisor(&signals, &clock, store(), &mut queue).unwrap();
        let mut parameters = parameters();
        parameters.num_of_dfc = 3;
        let routes: std::vec::Vec<Route> = routes().iter().filter(|route| route.dfc < 3).copied().collect();

        // When
        let result = supervisor.reprovision(parameters, &routes);

        // Then the stored table is untouched and the board still starts
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
        let store = supervisor.controller.store;
        let mut queue = Queue::new();
        let restarted = self::supervisor(&signals, &clock, store, &mut queue).unwrap();
        assert_eq!(&backplane(), restarted.config());
    }

    #[test]
    fn boot_confirmation_sets_the_image_ok_flag_once() {
        // Given
        let mut watchdog = FakeWatchdog::default();
        let mut flash = FakeFlash::new(Address(0x1003_7FE8), 8);

        // When
        let first = confirm_boot(&mut watchdog, &mut flash, Address(0x1003_7FE8));
        let second = confirm_boot(&mut watchdog, &mut flash, Address(0x1003_7FE8));

        // Then
        assert_eq!(Ok(BootConfirmation::Confirmed), first);
        assert_eq!(Ok(BootConfirmation::AlreadySet), second);
        assert_eq!(&[IMAGE_OK], flash.bytes(Address(0x1003_7FE8), 1));
        assert!(watchdog.released);
        assert_eq!(2, watchdog.kicks);
    }

    #[test]
    fn failed_boot_confirmation_is_reported() {
        let mut watchdog = FakeWatchdog::default();
        let mut flash = FakeFlash::new(Address(0), 8);
        flash.lose_power_after(0);
        assert!(confirm_boot(&mut watchdog, &mut flash, Address(0)).is_err());
    }
}
