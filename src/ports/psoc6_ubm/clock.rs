//! Millisecond clock driven by the SysTick exception.
use super::events;
use crate::{
    devices::supervisor::IngressEvent,
    hal::time::{self, Milliseconds},
};
use core::{
    ops::{Add, Sub},
    sync::atomic::{AtomicU32, Ordering},
};
use cortex_m::peripheral::{syst::SystClkSource, SYST};
use cortex_m_rt::exception;

static MILLISECONDS: AtomicU32 = AtomicU32::new(0);

/// Ticks posted to the supervisor queue are spaced this far apart.
const TICK_EVENT_PERIOD: u32 = 10;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub struct Instant(u32);

impl time::Instant for Instant {}

impl Sub for Instant {
    type Output = Milliseconds;
    fn sub(self, rhs: Self) -> Milliseconds { Milliseconds(self.0.wrapping_sub(rhs.0)) }
}

impl Add<Milliseconds> for Instant {
    type Output = Self;
    fn add(self, rhs: Milliseconds) -> Self { Instant(self.0.wrapping_add(rhs.0)) }
}

pub struct SysTick {
    _syst: SYST,
}

impl SysTick {
    /// Starts a 1kHz tick from the core clock.
    pub fn new(mut syst: SYST, core_clock_hz: u32) -> Self {
        syst.set_clock_source(SystClkSource::Core);
        syst.set_reload(core_clock_hz / 1000 - 1);
        syst.clear_current();
        syst.enable_interrupt();
        syst.enable_counter();
        Self { _syst: syst }
    }
}

impl time::Now for SysTick {
    type I = Instant;
    fn now(&self) -> Instant { Instant(MILLISECONDS.load(Ordering::Relaxed)) }
}

#[exception]
fn SysTick() {
    let now = MILLISECONDS.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
    if now % TICK_EVENT_PERIOD == 0 {
        events::post(IngressEvent::Tick);
    }
}
