//! Direct register access to the PSoC 6 GPIO ports. Drive modes and
//! interrupt edges are configured by the board support package.
use crate::{
    hal::gpio::{InputPin, OutputPin},
    ports::PinId,
};
use core::ptr::{read_volatile, write_volatile};

const GPIO_BASE: u32 = 0x4031_0000;
const PORT_STRIDE: u32 = 0x80;

const OUT_CLR: u32 = 0x04;
const OUT_SET: u32 = 0x08;
const IN: u32 = 0x10;

/// Highest port index of the package.
const LAST_PORT: u8 = 14;

pub struct Pin {
    id: PinId,
}

impl Pin {
    /// Claims a pin. Each `PinId` in the generated pin map is unique, so
    /// no two `Pin`s alias the same line.
    pub fn new(id: PinId) -> Option<Self> {
        (id.port <= LAST_PORT && id.pin < 8).then(|| Self { id })
    }

    fn register(&self, offset: u32) -> *mut u32 {
        (GPIO_BASE + self.id.port as u32 * PORT_STRIDE + offset) as *mut u32
    }

    fn mask(&self) -> u32 { 1 << self.id.pin }
}

impl InputPin for Pin {
    fn is_high(&self) -> bool {
        // Safety: `register` only yields addresses inside the GPIO block.
        unsafe { read_volatile(self.register(IN)) & self.mask() != 0 }
    }
}

impl OutputPin for Pin {
    fn set_low(&mut self) {
        // Safety: set and clear registers are write-one, other pins are untouched.
        unsafe { write_volatile(self.register(OUT_CLR), self.mask()) }
    }

    fn set_high(&mut self) {
        // Safety: as above.
        unsafe { write_volatile(self.register(OUT_SET), self.mask()) }
    }
}
