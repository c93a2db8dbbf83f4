//! Host command/response protocol.
//!
//! One `Engine` per host facing connector. Every transaction walks
//! `Idle -> ReceivingCommand -> Dispatching -> SendingResponse -> Idle`
//! and always ends in a response, successful or not. Commands are
//! validated in a fixed order (checksum, opcode, length, index,
//! permission) and a failure at any stage short-circuits to a status
//! code without touching connector or change state.
use super::{
    backplane::{codec, BackplaneConfig, ControllerFeatures, PerstOverride, RouteSchema},
    change::ChangeAggregator,
    config_store::PersistFeatures,
    connector::{Command, Connector},
    traits::Bus,
};
use crate::{
    error::{Error, Kind},
    hal::time::Instant,
};
use frame::{Request, MAX_COMMAND};
use heapless::Vec;
use response::Response;

pub mod frame;
pub mod response;

/// DFC control byte bits.
pub mod control {
    pub const RESET: u8 = 1 << 0;
    /// Level, not a pulse: the written value is the new power disable state.
    pub const POWER_DISABLE: u8 = 1 << 1;
    pub const CLEAR_CHANGE_COUNT: u8 = 1 << 2;
    pub const RELEASE_PERST: u8 = 1 << 3;
}

wire_enum! {
    pub enum Status {
        Success = 0x01,
        ChecksumError = 0x02,
        InvalidOpcode = 0x03,
        IndexOutOfRange = 0x04,
        NotPermitted = 0x05,
        MalformedFrame = 0x06,
        StoreFailure = 0x07,
        ResponseTooLong = 0x08,
    }
}

impl From<Error> for Status {
    fn from(error: Error) -> Self {
        match error {
            Error::ChecksumMismatch => Status::ChecksumError,
            Error::UnknownOpcode(_) => Status::InvalidOpcode,
            Error::IndexOutOfRange(_) => Status::IndexOutOfRange,
            Error::NotPermitted => Status::NotPermitted,
            Error::MalformedFrame => Status::MalformedFrame,
            Error::ResponseTooLong => Status::ResponseTooLong,
            _ => Status::StoreFailure,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub enum TransactionState {
    Idle,
    ReceivingCommand,
    Dispatching,
    SendingResponse,
}

/// Everything a dispatch may read or mutate, borrowed from the supervisor
/// for the length of one transaction.
pub struct Context<'a, I: Instant, P: PersistFeatures> {
    pub config: &'a BackplaneConfig,
    pub features: &'a mut ControllerFeatures,
    pub connectors: &'a mut [Connector<I>],
    pub aggregator: &'a mut ChangeAggregator,
    pub store: &'a mut P,
    pub config_corrupt: bool,
    pub now: I,
}

pub struct Engine {
    hfc: u8,
    state: TransactionState,
    last_status: Status,
    pending: Response,
}

impl Engine {
    pub fn new(hfc: u8) -> Self {
        Self { hfc, state: TransactionState::Idle, last_status: Status::Success, pending: Response::new() }
    }

    pub fn hfc(&self) -> u8 { self.hfc }
    pub fn state(&self) -> TransactionState { self.state }
    pub fn last_status(&self) -> Status { self.last_status }

    /// Drops any transaction in flight (2WIRE_RESET#).
    pub fn reset<B: Bus>(&mut self, bus: &mut B) {
        if self.state != TransactionState::Idle {
            warn!("HFC {}: transaction dropped by bus reset", self.hfc);
        }
        bus.abort();
        self.pending.clear();
        self.state = TransactionState::Idle;
    }

    /// Moves the current transaction forward as far as the bus allows.
    /// Never blocks: a bus with nothing to receive, or still clocking out
    /// a previous response, leaves the engine where it was.
    pub fn service<B: Bus, I: Instant, P: PersistFeatures>(
        &mut self,
        bus: &mut B,
        context: &mut Context<I, P>,
    ) -> Result<(), Error> {
        if self.state == TransactionState::Idle {
            self.state = TransactionState::ReceivingCommand;
        }

        if self.state == TransactionState::ReceivingCommand {
            let mut buffer = [0u8; MAX_COMMAND];
            match bus.receive(&mut buffer) {
                Err(nb::Error::WouldBlock) => {
                    self.state = TransactionState::Idle;
                    return Ok(());
                }
                Err(nb::Error::Other(e)) => {
                    self.state = TransactionState::Idle;
                    return Err(Error::from(e));
                }
                Ok(length) => {
                    self.state = TransactionState::Dispatching;
                    match self.handle(&buffer[..length], bus.address(), context) {
                        Ok(response) => {
                            self.pending = response;
                            self.state = TransactionState::SendingResponse;
                        }
                        Err(e) => {
                            self.state = TransactionState::Idle;
                            return Err(e);
                        }
                    }
                }
            }
        }

        if self.state == TransactionState::SendingResponse {
            match bus.respond(&self.pending) {
                Err(nb::Error::WouldBlock) => return Ok(()),
                Err(nb::Error::Other(e)) => {
                    self.state = TransactionState::Idle;
                    return Err(Error::from(e));
                }
                Ok(()) => self.state = TransactionState::Idle,
            }
        }
        Ok(())
    }

    /// Builds the response to one command frame. Failures to serve the
    /// command become failure statuses; only framing the response itself
    /// can fail.
    fn handle<I: Instant, P: PersistFeatures>(
        &mut self,
        bytes: &[u8],
        address: u8,
        context: &mut Context<I, P>,
    ) -> Result<Response, Error> {
        let check = context.features.write_checksum_checking;
        let outcome = frame::parse(bytes, address, check).and_then(|request| {
            let data = self.dispatch(request, context)?;
            Ok((request, data))
        });

        let (status, data) = match outcome {
            Ok((request, data)) => {
                if request != Request::LastCommandStatus {
                    self.last_status = Status::Success;
                }
                (Status::Success, data)
            }
            Err(e) => {
                if e.kind() == Kind::ProtocolError {
                    debug!("HFC {}: command refused: {:?}", self.hfc, e);
                } else {
                    e.report();
                }
                self.last_status = Status::from(e);
                (self.last_status, response::Data::new())
            }
        };

        let with_checksum = context.features.read_checksum_creation;
        let limit = context.config.parameters.overview.two_wire_max_byte_count.bytes();
        self.frame(status, &data, address, with_checksum, limit)
    }

    /// Frames a response, replacing it with a bare `ResponseTooLong` when
    /// it exceeds `limit`. Every data field defined today fits the
    /// smallest byte count; this catches longer fields as they are added.
    fn frame(
        &mut self,
        status: Status,
        data: &[u8],
        address: u8,
        with_checksum: bool,
        limit: usize,
    ) -> Result<Response, Error> {
        match response::build(status, data, address, with_checksum, limit) {
            Err(Error::ResponseTooLong) => {
                warn!("HFC {}: response exceeds {} bytes", self.hfc, limit);
                self.last_status = Status::ResponseTooLong;
                response::build(Status::ResponseTooLong, &[], address, with_checksum, limit)
            }
            other => other,
        }
    }

    fn dispatch<I: Instant, P: PersistFeatures>(
        &mut self,
        request: Request,
        context: &mut Context<I, P>,
    ) -> Result<response::Data, Error> {
        let config = context.config;
        match request {
            Request::OperationalState => response::operational_state(true, context.config_corrupt),
            Request::LastCommandStatus => response::Data::from_slice(&[self.last_status.code()])
                .map_err(|_| Error::ResponseTooLong),
            Request::SiliconIdentity => response::silicon_identity(config),
            Request::HostFacingConnectorInfo => response::host_facing_connector_info(config, self.hfc),
            Request::BackplaneInfo => response::backplane_info(config),
            Request::StartingSlot => response::starting_slot(config),
            Request::Capabilities => response::capabilities(config),
            Request::ReadFeatures => response::features(context.features),
            Request::WriteFeatures(bytes) => self.write_features(bytes, context),
            Request::ReadChangeCount => {
                let (count, dirty) = context.aggregator.read();
                response::change_count(count, dirty)
            }
            Request::ClearChangeCount => {
                info!("HFC {}: change count cleared", self.hfc);
                context.aggregator.clear();
                response::change_count(context.aggregator.count(), context.aggregator.dirty())
            }
            Request::RouteInformation(index) => response::route_information(config, self.hfc, index),
            Request::ReadDfcStatus(index) => {
                let dfc = self.routed_dfc(index, context)?;
                let report_count = config.capabilities().dfc_change_count_supported;
                response::dfc_status(context.connectors[dfc].state(), report_count)
            }
            Request::WriteDfcControl(index, bits) => self.write_dfc_control(index, bits, context),
        }
    }

    /// Index of a drive facing connector this host is wired to.
    fn routed_dfc<I: Instant, P: PersistFeatures>(
        &self,
        index: u8,
        context: &Context<I, P>,
    ) -> Result<usize, Error> {
        match context.config.routes.route(self.hfc, index) {
            Some(_) if (index as usize) < context.connectors.len() => Ok(index as usize),
            _ => Err(Error::IndexOutOfRange(index)),
        }
    }

    fn write_features<I: Instant, P: PersistFeatures>(
        &mut self,
        bytes: [u8; 2],
        context: &mut Context<I, P>,
    ) -> Result<response::Data, Error> {
        let requested = codec::decode_features(&bytes).map_err(|_| Error::MalformedFrame)?;
        let capabilities = context.config.capabilities();
        let needs_override = requested.perst_management_override == PerstOverride::HoldUntilReleased;
        if (needs_override && !capabilities.perst_override_supported)
            || (requested.smbus_reset_control && !capabilities.smb_reset_supported)
        {
            return Err(Error::NotPermitted);
        }

        let previous = *context.features;
        *context.features = requested;
        if let Err(e) = context.store.persist_features(&bytes) {
            *context.features = previous;
            return Err(e);
        }
        info!("HFC {}: features updated", self.hfc);
        response::features(context.features)
    }

    fn write_dfc_control<I: Instant, P: PersistFeatures>(
        &mut self,
        index: u8,
        bits: u8,
        context: &mut Context<I, P>,
    ) -> Result<response::Data, Error> {
        let dfc = self.routed_dfc(index, context)?;
        let config = context.config;
        let capabilities = config.capabilities();

        if config.parameters.schema == RouteSchema::Ubm0_5 {
            let writable = config.routes.route(self.hfc, index).map_or(false, |r| r.dfc_status_and_control);
            if !writable {
                return Err(Error::NotPermitted);
            }
        }

        let connector = &mut context.connectors[dfc];
        let mut commands: Vec<Command, 4> = Vec::new();
        let power_disable = bits & control::POWER_DISABLE != 0;
        let requested = [
            (bits & control::CLEAR_CHANGE_COUNT != 0).then(|| Command::ClearChangeCount),
            (power_disable != connector.state().pwr_disabled).then(|| Command::PowerDisable(power_disable)),
            (bits & control::RELEASE_PERST != 0).then(|| Command::ReleasePerst),
            (bits & control::RESET != 0).then(|| Command::Reset),
        ];
        for command in requested.into_iter().flatten() {
            connector.permits(command, capabilities)?;
            // Capacity matches the number of distinct commands.
            let _ = commands.push(command);
        }

        for command in commands {
            let changed = connector.command(command, capabilities, context.now)?;
            if context.aggregator.register(changed, context.features) {
                connector.count_change();
            }
        }
        response::dfc_status(connector.state(), capabilities.dfc_change_count_supported)
    }
}

#[cfg(test)]
mod test {
    use super::{frame::*, *};
    use crate::{
        devices::{
            backplane::test_support::{backplane, features},
            connector::{OperationalState, Policy},
            signals::{DriveType, LineState},
        },
        hal::{
            doubles::{time::FakeInstant, two_wire::FakeTwoWire},
            time::Milliseconds,
        },
    };

    const ADDRESS: u8 = 0x60;

    #[derive(Default)]
    struct FakeStore {
        persisted: std::vec::Vec<std::vec::Vec<u8>>,
        fail: bool,
    }

    impl PersistFeatures for FakeStore {
        fn persist_features(&mut self, bytes: &[u8]) -> Result<(), Error> {
            if self.fail {
                return Err(Error::WriteVerifyFailed);
            }
            self.persisted.push(bytes.to_vec());
            Ok(())
        }
    }

    struct Fixture {
        config: BackplaneConfig,
        features: ControllerFeatures,
        connectors: std::vec::Vec<Connector<FakeInstant>>,
        aggregator: ChangeAggregator,
        store: FakeStore,
        bus: FakeTwoWire,
        engine: Engine,
    }

    fn policy() -> Policy {
        Policy { settle_time: Milliseconds(400), perst_override: PerstOverride::FollowHost, host_perst: false }
    }

    impl Fixture {
        fn new(hfc: u8) -> Self {
            let config = backplane();
            let connectors = (0..config.num_of_dfc() as u8).map(|i| Connector::new(i, policy())).collect();
            Self {
                config,
                features: features(),
                connectors,
                aggregator: ChangeAggregator::new(),
                store: FakeStore::default(),
                bus: FakeTwoWire::new(ADDRESS),
                engine: Engine::new(hfc),
            }
        }

        fn install(&mut self, dfc: usize) {
            let drive = LineState::Present(DriveType::QuadPcie);
            self.connectors[dfc].step(drive, policy(), FakeInstant(0));
            let changed = self.connectors[dfc].step(drive, policy(), FakeInstant(400));
            if self.aggregator.register(changed, &self.features) {
                self.connectors[dfc].count_change();
            }
        }

        /// Sends one signed command and returns the response.
        fn transact(&mut self, body: &[u8]) -> std::vec::Vec<u8> {
            let mut frame = body.to_vec();
            frame.push(checksum(write_address(ADDRESS), body));
            self.transact_raw(&frame)
        }

        fn transact_raw(&mut self, frame: &[u8]) -> std::vec::Vec<u8> {
            self.bus.host_writes(frame);
            let mut context = Context {
                config: &self.config,
                features: &mut self.features,
                connectors: &mut self.connectors,
                aggregator: &mut self.aggregator,
                store: &mut self.store,
                config_corrupt: false,
                now: FakeInstant(1000),
            };
            self.engine.service(&mut self.bus, &mut context).unwrap();
            assert_eq!(TransactionState::Idle, self.engine.state());
            self.bus.last_response().unwrap().to_vec()
        }

        fn states(&self) -> std::vec::Vec<crate::devices::connector::DfcState> {
            self.connectors.iter().map(|c| *c.state()).collect()
        }
    }

    fn status(response: &[u8]) -> Status { Status::try_from(response[0]).unwrap() }

    #[test]
    fn idle_bus_leaves_engine_idle() {
        let mut fixture = Fixture::new(0);
        let mut context = Context {
            config: &fixture.config,
            features: &mut fixture.features,
            connectors: &mut fixture.connectors,
            aggregator: &mut fixture.aggregator,
            store: &mut fixture.store,
            config_corrupt: false,
            now: FakeInstant(0),
        };
        fixture.engine.service(&mut fixture.bus, &mut context).unwrap();
        assert_eq!(TransactionState::Idle, fixture.engine.state());
        assert!(fixture.bus.responses.is_empty());
    }

    #[test]
    fn checksum_mismatch_changes_nothing() {
        // Given
        let mut fixture = Fixture::new(0);
        fixture.install(1);
        let (states, aggregator) = (fixture.states(), fixture.aggregator.clone());

        // When
        let response = fixture.transact_raw(&[0x40, 0x01, control::RESET, 0x00]);

        // Then
        assert_eq!(Status::ChecksumError, status(&response));
        assert_eq!(states, fixture.states());
        assert_eq!(aggregator, fixture.aggregator);
        assert_eq!(Status::ChecksumError, fixture.engine.last_status());
    }

    #[test]
    fn out_of_range_index_changes_nothing() {
        // Given
        let mut fixture = Fixture::new(0);
        let states = fixture.states();

        // When: DFC 3 is only wired to HFC 1, DFC 9 doesn't exist
        let unrouted = fixture.transact(&[0x40, 0x03, control::POWER_DISABLE]);
        let missing = fixture.transact(&[0x40, 0x09, control::POWER_DISABLE]);

        // Then
        assert_eq!(Status::IndexOutOfRange, status(&unrouted));
        assert_eq!(Status::IndexOutOfRange, status(&missing));
        assert_eq!(states, fixture.states());
    }

    #[test]
    fn unknown_opcodes_are_reported() {
        let mut fixture = Fixture::new(0);
        let response = fixture.transact(&[0x03]);
        assert_eq!(Status::InvalidOpcode, status(&response));
        assert_eq!(0, response[1]);

        let last = fixture.transact(&[0x01]);
        assert_eq!(Status::Success, status(&last));
        assert_eq!(Status::InvalidOpcode.code(), last[2]);
    }

    #[test]
    fn reset_write_applies_before_responding() {
        // Given
        let mut fixture = Fixture::new(0);
        fixture.install(2);

        // When
        let response = fixture.transact(&[0x40, 0x02, control::RESET]);

        // Then
        assert_eq!(Status::Success, status(&response));
        assert_eq!(OperationalState::Resetting.code(), response[2]);
        assert_eq!(OperationalState::Resetting, fixture.connectors[2].state().operational_state);
        assert_eq!(2, fixture.aggregator.count());
        assert_eq!(2, fixture.connectors[2].state().change_count);
    }

    #[test]
    fn refused_commands_apply_nothing() {
        // Reset on an empty connector isn't permitted, so power disable isn't applied either
        let mut fixture = Fixture::new(0);
        let response = fixture.transact(&[0x40, 0x02, control::RESET | control::POWER_DISABLE]);
        assert_eq!(Status::NotPermitted, status(&response));
        assert!(!fixture.connectors[2].state().pwr_disabled);
    }

    #[test]
    fn legacy_routes_without_control_refuse_writes() {
        let mut fixture = Fixture::new(0);
        let mut routes: std::vec::Vec<_> = fixture.config.routes.iter().copied().collect();
        routes[1].dfc_status_and_control = false;
        let mut parameters = fixture.config.parameters;
        parameters.schema = RouteSchema::Ubm0_5;
        fixture.config = BackplaneConfig::new(parameters, &routes).unwrap();

        let response = fixture.transact(&[0x40, 0x01, control::POWER_DISABLE]);
        assert_eq!(Status::NotPermitted, status(&response));
        let response = fixture.transact(&[0x40, 0x01]);
        assert_eq!(Status::Success, status(&response));
    }

    #[test]
    fn change_count_read_releases_latch_and_clear_zeroes() {
        // Given
        let mut fixture = Fixture::new(0);
        fixture.install(0);

        // When
        let read = fixture.transact(&[0x09]);

        // Then
        assert_eq!(&[0x01, 0x02, 0x01], &read[..3]);
        assert!(!fixture.aggregator.latched());
        assert_eq!(1, fixture.aggregator.count());

        let cleared = fixture.transact(&[0x09, 0x00]);
        assert_eq!(&[0x01, 0x02, 0x00, 0x00], &cleared[..4]);
        assert!(fixture.connectors[0].is_installed());
    }

    #[test]
    fn features_write_persists_or_rolls_back() {
        // Given
        let mut fixture = Fixture::new(1);
        let disabled_read_checksums = [0b0000_0010, PerstOverride::FollowHost.code()];

        // When
        let response = fixture.transact(&[0x08, disabled_read_checksums[0], disabled_read_checksums[1]]);

        // Then: answered without a checksum, as the new features say
        assert_eq!(&[0x01, 0x02, 0b0000_0010, 0x00], response.as_slice());
        assert_eq!(vec![disabled_read_checksums.to_vec()], fixture.store.persisted);
        assert!(!fixture.features.read_checksum_creation);

        // When the store fails, nothing changes
        fixture.store.fail = true;
        let response = fixture.transact(&[0x08, 0b0000_0011, 0x00]);
        assert_eq!(Status::StoreFailure, status(&response));
        assert!(!fixture.features.read_checksum_creation);
    }

    #[test]
    fn unchecked_commands_are_accepted_when_checking_is_off() {
        let mut fixture = Fixture::new(0);
        fixture.features.write_checksum_checking = false;
        let response = fixture.transact_raw(&[0x06]);
        assert_eq!(Status::Success, status(&response));
        assert_eq!(8, response[2]);
    }

    #[test]
    fn oversized_responses_become_a_response_too_long_status() {
        // Given
        let mut engine = Engine::new(0);

        // When
        let response = engine.frame(Status::Success, &[0xAB; 12], ADDRESS, true, 8).unwrap();

        // Then
        assert_eq!(&[Status::ResponseTooLong.code(), 0x00], &response[..2]);
        assert_eq!(3, response.len());
        assert_eq!(Status::ResponseTooLong, engine.last_status());
    }

    #[test]
    fn host_facing_info_counts_routes_of_this_host() {
        let mut fixture = Fixture::new(1);
        let response = fixture.transact(&[0x04]);
        assert_eq!(Status::Success, status(&response));
        assert_eq!(10, response[1]);
        assert_eq!(&[1, 2], &response[10..12]);
    }

    #[test]
    fn busy_bus_keeps_the_response_pending() {
        // Given
        let mut fixture = Fixture::new(0);
        fixture.bus.busy_responses = 1;
        fixture.bus.host_writes(&[0x06, checksum(write_address(ADDRESS), &[0x06])]);
        let mut context = Context {
            config: &fixture.config,
            features: &mut fixture.features,
            connectors: &mut fixture.connectors,
            aggregator: &mut fixture.aggregator,
            store: &mut fixture.store,
            config_corrupt: true,
            now: FakeInstant(0),
        };

        // When
        fixture.engine.service(&mut fixture.bus, &mut context).unwrap();
        let waiting = fixture.engine.state();
        fixture.engine.service(&mut fixture.bus, &mut context).unwrap();

        // Then
        assert_eq!(TransactionState::SendingResponse, waiting);
        assert_eq!(TransactionState::Idle, fixture.engine.state());
        assert_eq!(1, fixture.bus.responses.len());
    }

    #[test]
    fn bus_reset_drops_the_transaction() {
        let mut fixture = Fixture::new(0);
        fixture.bus.busy_responses = 1;
        fixture.transact_pending();
        fixture.engine.reset(&mut fixture.bus);
        assert_eq!(TransactionState::Idle, fixture.engine.state());
        assert_eq!(1, fixture.bus.aborts);
    }

    impl Fixture {
        fn transact_pending(&mut self) {
            self.bus.host_writes(&[0x00, checksum(write_address(ADDRESS), &[0x00])]);
            let mut context = Context {
                config: &self.config,
                features: &mut self.features,
                connectors: &mut self.connectors,
                aggregator: &mut self.aggregator,
                store: &mut self.store,
                config_corrupt: false,
                now: FakeInstant(0),
            };
            self.engine.service(&mut self.bus, &mut context).unwrap();
            assert_eq!(TransactionState::SendingResponse, self.engine.state());
        }
    }

    #[test]
    fn operational_state_reports_config_corruption() {
        assert_eq!(&[0b11], response::operational_state(true, true).unwrap().as_slice());
        assert_eq!(Status::StoreFailure, Status::from(Error::RecordCorrupt));
    }
}
