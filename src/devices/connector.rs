//! Drive facing connector state machine.
//!
//! ```text
//!            presence             settle time
//!   Empty ─────────────► Detected ────────────► Installed ◄──┐
//!     ▲                     │                      │  host    │ 100ms
//!     └──── removal ────────┴──────── removal ─────┤  reset   │
//!                                                  ▼          │
//!                                              Resetting ─────┘
//!
//!   any state ── fault ──► Unknown ── two valid samples ──► Detected | Empty
//! ```
use super::{
    backplane::{Capabilities, PerstOverride},
    change::ChangeFields,
    signals::{DfcOutputs, DriveType, LineState},
};
use crate::{
    error::Error,
    hal::time::{Instant, Milliseconds},
};

/// Minimum width of a host requested PERST# pulse.
pub const RESET_PULSE: Milliseconds = Milliseconds(100);
const SAMPLES_TO_RECOVER: u8 = 2;

wire_enum! {
    pub enum OperationalState { Empty = 0, Detected = 1, Installed = 2, Resetting = 3, Unknown = 4 }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct DfcState {
    pub installed: bool,
    pub drive_type_detected: Option<DriveType>,
    pub operational_state: OperationalState,
    pub perst_asserted: bool,
    pub pwr_disabled: bool,
    pub change_count: u8,
}

impl Default for DfcState {
    fn default() -> Self {
        Self {
            installed: false,
            drive_type_detected: None,
            operational_state: OperationalState::Empty,
            perst_asserted: true,
            pwr_disabled: false,
            change_count: 0,
        }
    }
}

/// Host requested connector operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub enum Command {
    Reset,
    PowerDisable(bool),
    ReleasePerst,
    ClearChangeCount,
}

/// Inputs to a step that don't come from the connector's own lines.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Policy {
    pub settle_time: Milliseconds,
    pub perst_override: PerstOverride,
    /// PERST# asserted by any host wired to this connector.
    pub host_perst: bool,
}

/// What the host can observe of a connector, for change counting.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct HostView {
    state: OperationalState,
    drive_type: Option<DriveType>,
    perst: bool,
    pwr_disabled: bool,
}

impl HostView {
    fn of(state: &DfcState) -> Self {
        // A drive still settling isn't reported as a change yet.
        let visible = match state.operational_state {
            OperationalState::Detected => OperationalState::Empty,
            other => other,
        };
        HostView {
            state: visible,
            drive_type: if state.installed { state.drive_type_detected } else { None },
            perst: state.perst_asserted,
            pwr_disabled: state.pwr_disabled,
        }
    }

    fn diff(&self, other: &Self) -> ChangeFields {
        let mut changed = ChangeFields::empty();
        changed.set(ChangeFields::OPERATIONAL_STATE, self.state != other.state);
        changed.set(ChangeFields::DRIVE_TYPE, self.drive_type != other.drive_type);
        changed.set(ChangeFields::PCIE_RESET, self.perst != other.perst);
        changed.set(ChangeFields::POWER_DISABLE, self.pwr_disabled != other.pwr_disabled);
        changed
    }
}

pub struct Connector<I: Instant> {
    index: u8,
    state: DfcState,
    entered: Option<I>,
    valid_streak: u8,
    perst_released: bool,
    policy: Policy,
    counted: HostView,
}

impl<I: Instant> Connector<I> {
    pub fn new(index: u8, policy: Policy) -> Self {
        let mut connector = Self {
            index,
            state: DfcState::default(),
            entered: None,
            valid_streak: 0,
            perst_released: false,
            policy,
            counted: HostView::of(&DfcState::default()),
        };
        connector.refresh_perst();
        connector.counted = HostView::of(&connector.state);
        connector
    }

    pub fn index(&self) -> u8 { self.index }
    pub fn state(&self) -> &DfcState { &self.state }
    pub fn is_installed(&self) -> bool { self.state.installed }

    /// Advances the machine with one debounced sample. Returns the host
    /// visible fields that changed, if any.
    pub fn step(&mut self, line: LineState, policy: Policy, now: I) -> ChangeFields {
        self.policy = policy;
        let previous = self.state.operational_state;

        match (previous, line) {
            (OperationalState::Unknown, LineState::Fault) => self.valid_streak = 0,
            (_, LineState::Fault) => {
                warn!("DFC {} lines faulted in state {:?}", self.index, previous);
                self.state.operational_state = OperationalState::Unknown;
                self.valid_streak = 0;
                self.entered = None;
            }
            (OperationalState::Unknown, line) => {
                self.valid_streak = self.valid_streak.saturating_add(1);
                if self.valid_streak >= SAMPLES_TO_RECOVER {
                    self.state.installed = false;
                    match line {
                        LineState::Present(drive) => self.detect(drive, now),
                        _ => self.empty(),
                    }
                }
            }
            (OperationalState::Empty, LineState::Present(drive)) => self.detect(drive, now),
            (_, LineState::Empty) if previous != OperationalState::Empty => self.empty(),
            (OperationalState::Detected, LineState::Present(drive)) => {
                if self.state.drive_type_detected != Some(drive) {
                    self.detect(drive, now);
                } else if self.elapsed(now) >= self.policy.settle_time {
                    self.state.operational_state = OperationalState::Installed;
                    self.state.installed = true;
                    self.perst_released = false;
                    self.entered = None;
                }
            }
            (OperationalState::Installed | OperationalState::Resetting, LineState::Present(drive))
                if self.state.drive_type_detected != Some(drive) =>
            {
                self.state.installed = false;
                self.detect(drive, now);
            }
            (OperationalState::Resetting, LineState::Present(_)) => {
                if self.elapsed(now) >= RESET_PULSE {
                    self.state.operational_state = OperationalState::Installed;
                    self.entered = None;
                }
            }
            _ => (),
        }

        if self.state.operational_state != previous {
            debug!("DFC {}: {:?} -> {:?}", self.index, previous, self.state.operational_state);
        }
        self.refresh_perst();
        self.take_changes()
    }

    /// Checks a command against the connector's state and the backplane
    /// capabilities, without applying it.
    pub fn permits(&self, command: Command, capabilities: &Capabilities) -> Result<(), Error> {
        let permitted = match command {
            Command::Reset => {
                capabilities.pcie_reset_control
                    && matches!(
                        self.state.operational_state,
                        OperationalState::Installed | OperationalState::Resetting
                    )
            }
            Command::PowerDisable(_) => capabilities.slot_power_control,
            Command::ReleasePerst => {
                capabilities.pcie_reset_control
                    && capabilities.perst_override_supported
                    && self.policy.perst_override == PerstOverride::HoldUntilReleased
            }
            Command::ClearChangeCount => true,
        };
        if permitted {
            Ok(())
        } else {
            Err(Error::NotPermitted)
        }
    }

    /// Applies a host command immediately. Returns the host visible fields
    /// that changed.
    pub fn command(
        &mut self,
        command: Command,
        capabilities: &Capabilities,
        now: I,
    ) -> Result<ChangeFields, Error> {
        self.permits(command, capabilities)?;
        match command {
            Command::Reset => {
                info!("DFC {}: host requested reset", self.index);
                self.state.operational_state = OperationalState::Resetting;
                self.entered = Some(now);
            }
            Command::PowerDisable(disabled) => self.state.pwr_disabled = disabled,
            Command::ReleasePerst => self.perst_released = true,
            Command::ClearChangeCount => self.state.change_count = 0,
        }
        self.refresh_perst();
        Ok(self.take_changes())
    }

    /// Counts one host visible transition on this connector.
    pub fn count_change(&mut self) { self.state.change_count = self.state.change_count.wrapping_add(1) }

    pub fn outputs(&self, capabilities: &Capabilities, has_secondary: bool) -> DfcOutputs {
        DfcOutputs {
            perst_a: self.state.perst_asserted,
            perst_b: self.state.perst_asserted,
            pwrdis: self.state.pwr_disabled,
            refclk_en: self.state.installed && capabilities.clock_routing,
            dualport_en: capabilities.dual_port && has_secondary,
        }
    }

    fn detect(&mut self, drive: DriveType, now: I) {
        self.state.operational_state = OperationalState::Detected;
        self.state.drive_type_detected = Some(drive);
        self.entered = Some(now);
    }

    fn empty(&mut self) {
        self.state.operational_state = OperationalState::Empty;
        self.state.installed = false;
        self.state.drive_type_detected = None;
        self.entered = None;
    }

    fn elapsed(&self, now: I) -> Milliseconds { self.entered.map_or(Milliseconds(0), |since| now - since) }

    fn refresh_perst(&mut self) {
        if self.state.operational_state == OperationalState::Unknown {
            return;
        }
        let held = match self.policy.perst_override {
            PerstOverride::FollowHost => self.policy.host_perst,
            PerstOverride::HoldUntilReleased => !self.perst_released,
        };
        self.state.perst_asserted = !self.state.installed
            || held
            || self.state.operational_state == OperationalState::Resetting;
    }

    fn take_changes(&mut self) -> ChangeFields {
        if self.state.operational_state == OperationalState::Unknown {
            return ChangeFields::empty();
        }
        let view = HostView::of(&self.state);
        let changed = view.diff(&self.counted);
        self.counted = view;
        changed
    }
}
