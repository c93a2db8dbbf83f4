//! Connector signal lines and their debounced, decoded state.
//!
//! Everything above this module deals in logical levels (`true` means
//! asserted). Electrical polarity is resolved once, in `PinSignalDriver`.
use super::backplane::{MAX_DFC, MAX_HFC};
use crate::{
    error::Error,
    hal::{
        gpio::{InputPin, OutputPin},
        time::{Instant, Milliseconds},
    },
};
use heapless::Vec;

pub const DEFAULT_DEBOUNCE: Milliseconds = Milliseconds(10);

/// Drive facing connector inputs.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct DfcLines {
    pub prsnt: bool,
    pub ifdet: bool,
    pub ifdet2: bool,
    pub activity: bool,
}

/// Host facing connector inputs.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct HfcLines {
    pub perst: bool,
    pub two_wire_reset: bool,
}

/// Drive facing connector outputs.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct DfcOutputs {
    pub perst_a: bool,
    pub perst_b: bool,
    pub pwrdis: bool,
    pub refclk_en: bool,
    pub dualport_en: bool,
}

/// Access to every backplane signal by connector index. Core logic never
/// names a pin.
pub trait SignalDriver {
    fn dfc_count(&self) -> usize;
    fn hfc_count(&self) -> usize;
    fn read_dfc(&self, dfc: usize) -> Result<DfcLines, Error>;
    fn read_hfc(&self, hfc: usize) -> Result<HfcLines, Error>;
    fn drive_dfc(&mut self, dfc: usize, outputs: DfcOutputs) -> Result<(), Error>;
    fn drive_change_detect(&mut self, hfc: usize, asserted: bool) -> Result<(), Error>;
}

wire_enum! {
    /// Drive family, as encoded by the interface detect lines.
    pub enum DriveType { SffTa1001 = 0, GenZ = 1, SasSata = 2, QuadPcie = 3 }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub enum LineState {
    Empty,
    Present(DriveType),
    /// Electrically invalid combination, or lines that couldn't be read.
    Fault,
}

impl LineState {
    pub fn decode(lines: DfcLines) -> Self {
        match (lines.prsnt, lines.ifdet, lines.ifdet2) {
            (false, false, false) if lines.activity => LineState::Fault,
            (false, false, false) => LineState::Empty,
            (true, false, false) => LineState::Present(DriveType::SasSata),
            (false, true, false) => LineState::Present(DriveType::QuadPcie),
            (true, true, false) => LineState::Present(DriveType::SffTa1001),
            (false, true, true) => LineState::Present(DriveType::GenZ),
            _ => LineState::Fault,
        }
    }

    pub fn is_present(&self) -> bool { matches!(self, LineState::Present(_)) }
}

/// Debounced view of every connector at one point in time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalSnapshot {
    pub dfc: Vec<LineState, MAX_DFC>,
    pub hfc: Vec<HfcLines, MAX_HFC>,
}

struct Debounced<I: Instant> {
    stable: LineState,
    pending: Option<(LineState, I)>,
}

impl<I: Instant> Debounced<I> {
    fn update(&mut self, reading: LineState, now: I, window: Milliseconds) {
        if reading == self.stable {
            self.pending = None;
            return;
        }
        let since = match self.pending {
            Some((candidate, since)) if candidate == reading => since,
            _ => {
                self.pending = Some((reading, now));
                now
            }
        };
        if now - since >= window {
            self.stable = reading;
            self.pending = None;
        }
    }
}

/// Turns raw line reads into stable connector states. A new reading must
/// hold for the whole debounce window before it is reported.
pub struct Sampler<I: Instant> {
    window: Milliseconds,
    dfc: Vec<Debounced<I>, MAX_DFC>,
    hfc: Vec<HfcLines, MAX_HFC>,
}

impl<I: Instant> Sampler<I> {
    pub fn new(dfc_count: usize, hfc_count: usize, window: Milliseconds) -> Result<Self, Error> {
        if dfc_count > MAX_DFC || hfc_count > MAX_HFC {
            return Err(Error::TooManyConnectors);
        }
        let mut dfc = Vec::new();
        let mut hfc = Vec::new();
        for _ in 0..dfc_count {
            dfc.push(Debounced { stable: LineState::Empty, pending: None })
                .map_err(|_| Error::TooManyConnectors)?;
        }
        for _ in 0..hfc_count {
            hfc.push(HfcLines::default()).map_err(|_| Error::TooManyConnectors)?;
        }
        Ok(Self { window, dfc, hfc })
    }

    pub fn sample<S: SignalDriver>(&mut self, driver: &S, now: I) -> SignalSnapshot {
        let window = self.window;
        for (index, line) in self.dfc.iter_mut().enumerate() {
            match driver.read_dfc(index) {
                Ok(lines) => line.update(LineState::decode(lines), now, window),
                Err(e) => {
                    warn!("Unreadable lines on DFC {}: {:?}", index, e);
                    line.stable = LineState::Fault;
                    line.pending = None;
                }
            }
        }
        for (index, lines) in self.hfc.iter_mut().enumerate() {
            match driver.read_hfc(index) {
                Ok(read) => *lines = read,
                Err(e) => warn!("Unreadable lines on HFC {}, keeping last: {:?}", index, e),
            }
        }
        SignalSnapshot {
            dfc: self.dfc.iter().map(|line| line.stable).collect(),
            hfc: self.hfc.clone(),
        }
    }
}

pub struct DfcPins<I: InputPin, O: OutputPin> {
    pub prsnt: Option<I>,
    pub ifdet: Option<I>,
    pub ifdet2: Option<I>,
    pub actdetect: Option<I>,
    pub persta: Option<O>,
    pub perstb: Option<O>,
    pub pwrdis: Option<O>,
    pub refclken: Option<O>,
    pub dualporten: Option<O>,
}

pub struct HfcPins<I: InputPin, O: OutputPin> {
    pub perst: Option<I>,
    pub two_wire_reset: Option<I>,
    pub change_detect: Option<O>,
}

/// Signal driver over plain GPIO. Unconnected inputs read as
/// deasserted; unconnected outputs are skipped.
///
/// | Signal         | Active |
/// |----------------|--------|
/// | PRSNT#, IFDET# | low    |
/// | IFDET2#        | low    |
/// | ACTDETECT#     | low    |
/// | HFC PERST#     | low    |
/// | 2WIRE_RESET#   | low    |
/// | PERST#         | low    |
/// | DUALPORT_EN#   | low    |
/// | CHANGE_DETECT# | low    |
/// | PWRDIS         | high   |
/// | REFCLK_EN      | high   |
pub struct PinSignalDriver<I: InputPin, O: OutputPin> {
    dfc: Vec<DfcPins<I, O>, MAX_DFC>,
    hfc: Vec<HfcPins<I, O>, MAX_HFC>,
}

fn asserted_low<I: InputPin>(pin: &Option<I>) -> bool { pin.as_ref().map_or(false, |p| p.is_low()) }

fn drive<O: OutputPin>(pin: &mut Option<O>, high: bool) {
    if let Some(pin) = pin {
        pin.set_level(high);
    }
}

impl<I: InputPin, O: OutputPin> PinSignalDriver<I, O> {
    pub fn new(
        dfc: impl IntoIterator<Item = DfcPins<I, O>>,
        hfc: impl IntoIterator<Item = HfcPins<I, O>>,
    ) -> Result<Self, Error> {
        let mut driver = Self { dfc: Vec::new(), hfc: Vec::new() };
        for pins in dfc {
            driver.dfc.push(pins).map_err(|_| Error::TooManyConnectors)?;
        }
        for pins in hfc {
            driver.hfc.push(pins).map_err(|_| Error::TooManyConnectors)?;
        }
        Ok(driver)
    }
}

impl<I: InputPin, O: OutputPin> SignalDriver for PinSignalDriver<I, O> {
    fn dfc_count(&self) -> usize { self.dfc.len() }
    fn hfc_count(&self) -> usize { self.hfc.len() }

    fn read_dfc(&self, dfc: usize) -> Result<DfcLines, Error> {
        let pins = self.dfc.get(dfc).ok_or(Error::IndexOutOfRange(dfc as u8))?;
        Ok(DfcLines {
            prsnt: asserted_low(&pins.prsnt),
            ifdet: asserted_low(&pins.ifdet),
            ifdet2: asserted_low(&pins.ifdet2),
            activity: asserted_low(&pins.actdetect),
        })
    }

    fn read_hfc(&self, hfc: usize) -> Result<HfcLines, Error> {
        let pins = self.hfc.get(hfc).ok_or(Error::IndexOutOfRange(hfc as u8))?;
        Ok(HfcLines {
            perst: asserted_low(&pins.perst),
            two_wire_reset: asserted_low(&pins.two_wire_reset),
        })
    }

    fn drive_dfc(&mut self, dfc: usize, outputs: DfcOutputs) -> Result<(), Error> {
        let pins = self.dfc.get_mut(dfc).ok_or(Error::IndexOutOfRange(dfc as u8))?;
        drive(&mut pins.persta, !outputs.perst_a);
        drive(&mut pins.perstb, !outputs.perst_b);
        drive(&mut pins.pwrdis, outputs.pwrdis);
        drive(&mut pins.refclken, outputs.refclk_en);
        drive(&mut pins.dualporten, !outputs.dualport_en);
        Ok(())
    }

    fn drive_change_detect(&mut self, hfc: usize, asserted: bool) -> Result<(), Error> {
        let pins = self.hfc.get_mut(hfc).ok_or(Error::IndexOutOfRange(hfc as u8))?;
        drive(&mut pins.change_detect, !asserted);
        Ok(())
    }
}

#[cfg(test)]
pub mod doubles {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    impl DfcLines {
        pub fn for_drive(drive: DriveType) -> Self {
            let (prsnt, ifdet, ifdet2) = match drive {
                DriveType::SasSata => (true, false, false),
                DriveType::QuadPcie => (false, true, false),
                DriveType::SffTa1001 => (true, true, false),
                DriveType::GenZ => (false, true, true),
            };
            DfcLines { prsnt, ifdet, ifdet2, activity: false }
        }
    }

    #[derive(Debug, Default)]
    struct Board {
        dfc: std::vec::Vec<DfcLines>,
        unreadable: std::vec::Vec<bool>,
        hfc: std::vec::Vec<HfcLines>,
        outputs: std::vec::Vec<DfcOutputs>,
        change_detect: std::vec::Vec<bool>,
    }

    /// Signal driver double. Clones share the same board, so a test can
    /// keep a handle to a driver it moved into the supervisor.
    #[derive(Clone, Debug, Default)]
    pub struct FakeSignals {
        board: Rc<RefCell<Board>>,
    }

    impl FakeSignals {
        pub fn new(dfc: usize, hfc: usize) -> Self {
            let board = Board {
                dfc: vec![DfcLines::default(); dfc],
                unreadable: vec![false; dfc],
                hfc: vec![HfcLines::default(); hfc],
                outputs: vec![DfcOutputs::default(); dfc],
                change_detect: vec![false; hfc],
            };
            Self { board: Rc::new(RefCell::new(board)) }
        }

        pub fn set(&self, dfc: usize, lines: DfcLines) { self.board.borrow_mut().dfc[dfc] = lines }
        pub fn insert(&self, dfc: usize, drive: DriveType) { self.set(dfc, DfcLines::for_drive(drive)) }
        pub fn remove(&self, dfc: usize) { self.set(dfc, DfcLines::default()) }
        pub fn unreadable(&self, dfc: usize, unreadable: bool) {
            self.board.borrow_mut().unreadable[dfc] = unreadable
        }
        pub fn host_perst(&self, hfc: usize, asserted: bool) {
            self.board.borrow_mut().hfc[hfc].perst = asserted
        }
        pub fn two_wire_reset(&self, hfc: usize, asserted: bool) {
            self.board.borrow_mut().hfc[hfc].two_wire_reset = asserted
        }
        pub fn outputs(&self, dfc: usize) -> DfcOutputs { self.board.borrow().outputs[dfc] }
        pub fn change_detect(&self, hfc: usize) -> bool { self.board.borrow().change_detect[hfc] }
    }

    impl SignalDriver for FakeSignals {
        fn dfc_count(&self) -> usize { self.board.borrow().dfc.len() }
        fn hfc_count(&self) -> usize { self.board.borrow().hfc.len() }

        fn read_dfc(&self, dfc: usize) -> Result<DfcLines, Error> {
            let board = self.board.borrow();
            if board.unreadable[dfc] {
                return Err(Error::SignalFault);
            }
            Ok(board.dfc[dfc])
        }

        fn read_hfc(&self, hfc: usize) -> Result<HfcLines, Error> { Ok(self.board.borrow().hfc[hfc]) }

        fn drive_dfc(&mut self, dfc: usize, outputs: DfcOutputs) -> Result<(), Error> {
            self.board.borrow_mut().outputs[dfc] = outputs;
            Ok(())
        }

        fn drive_change_detect(&mut self, hfc: usize, asserted: bool) -> Result<(), Error> {
            self.board.borrow_mut().change_detect[hfc] = asserted;
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::{doubles::FakeSignals, *};
    use crate::hal::doubles::{gpio::MockPin, time::FakeInstant};

    fn sampler() -> Sampler<FakeInstant> { Sampler::new(2, 1, DEFAULT_DEBOUNCE).unwrap() }

    #[test]
    fn line_combinations_decode_per_table() {
        let decode = |prsnt, ifdet, ifdet2| {
            LineState::decode(DfcLines { prsnt, ifdet, ifdet2, activity: false })
        };
        assert_eq!(LineState::Empty, decode(false, false, false));
        assert_eq!(LineState::Present(DriveType::SasSata), decode(true, false, false));
        assert_eq!(LineState::Present(DriveType::QuadPcie), decode(false, true, false));
        assert_eq!(LineState::Present(DriveType::SffTa1001), decode(true, true, false));
        assert_eq!(LineState::Present(DriveType::GenZ), decode(false, true, true));
        assert_eq!(LineState::Fault, decode(false, false, true));
        assert_eq!(LineState::Fault, decode(true, false, true));
        assert_eq!(LineState::Fault, decode(true, true, true));
    }

    #[test]
    fn activity_without_a_drive_is_a_fault() {
        let lines = DfcLines { activity: true, ..Default::default() };
        assert_eq!(LineState::Fault, LineState::decode(lines));
        let lines = DfcLines { activity: true, ..DfcLines::for_drive(DriveType::QuadPcie) };
        assert_eq!(LineState::Present(DriveType::QuadPcie), LineState::decode(lines));
    }

    #[test]
    fn new_state_is_reported_after_the_debounce_window() {
        // Given
        let signals = FakeSignals::new(2, 1);
        let mut sampler = sampler();

        // When
        signals.insert(1, DriveType::SasSata);
        let early = sampler.sample(&signals, FakeInstant(0));
        let still_early = sampler.sample(&signals, FakeInstant(9));
        let settled = sampler.sample(&signals, FakeInstant(10));

        // Then
        assert_eq!(LineState::Empty, early.dfc[1]);
        assert_eq!(LineState::Empty, still_early.dfc[1]);
        assert_eq!(LineState::Present(DriveType::SasSata), settled.dfc[1]);
        assert_eq!(LineState::Empty, settled.dfc[0]);
    }

    #[test]
    fn bouncing_presence_is_never_reported() {
        let signals = FakeSignals::new(2, 1);
        let mut sampler = sampler();

        for ms in 0..100u32 {
            if (ms / 4) % 2 == 0 {
                signals.insert(0, DriveType::QuadPcie);
            } else {
                signals.remove(0);
            }
            assert_eq!(LineState::Empty, sampler.sample(&signals, FakeInstant(ms)).dfc[0]);
        }
    }

    #[test]
    fn unreadable_lines_fault_immediately() {
        let signals = FakeSignals::new(2, 1);
        let mut sampler = sampler();

        signals.unreadable(0, true);
        assert_eq!(LineState::Fault, sampler.sample(&signals, FakeInstant(0)).dfc[0]);

        signals.unreadable(0, false);
        assert_eq!(LineState::Fault, sampler.sample(&signals, FakeInstant(1)).dfc[0]);
        assert_eq!(LineState::Empty, sampler.sample(&signals, FakeInstant(11)).dfc[0]);
    }

    #[test]
    fn host_lines_pass_through_undebounced() {
        let signals = FakeSignals::new(2, 1);
        let mut sampler = sampler();
        signals.host_perst(0, true);
        let snapshot = sampler.sample(&signals, FakeInstant(0));
        assert_eq!(HfcLines { perst: true, two_wire_reset: false }, snapshot.hfc[0]);
    }

    #[test]
    fn pin_driver_resolves_polarity() {
        // Given
        let (prsnt, ifdet) = (MockPin::high(), MockPin::high());
        let (persta, pwrdis, dualporten) = (MockPin::low(), MockPin::low(), MockPin::low());
        let change_detect = MockPin::low();
        let dfc = DfcPins {
            prsnt: Some(prsnt.clone()),
            ifdet: Some(ifdet.clone()),
            ifdet2: None,
            actdetect: None,
            persta: Some(persta.clone()),
            perstb: None,
            pwrdis: Some(pwrdis.clone()),
            refclken: None,
            dualporten: Some(dualporten.clone()),
        };
        let hfc = HfcPins { perst: None, two_wire_reset: None, change_detect: Some(change_detect.clone()) };
        let mut driver = PinSignalDriver::new([dfc], [hfc]).unwrap();

        // When
        prsnt.drive(false);
        let lines = driver.read_dfc(0).unwrap();
        let outputs = DfcOutputs { perst_a: true, pwrdis: true, dualport_en: false, ..Default::default() };
        driver.drive_dfc(0, outputs).unwrap();
        driver.drive_change_detect(0, true).unwrap();

        // Then
        assert_eq!(DfcLines { prsnt: true, ..Default::default() }, lines);
        assert_eq!(vec![false], persta.changes());
        assert_eq!(vec![true], pwrdis.changes());
        assert_eq!(vec![true], dualporten.changes());
        assert_eq!(vec![false], change_detect.changes());
        assert_eq!(Err(Error::IndexOutOfRange(1)), driver.read_dfc(1));
    }
}
