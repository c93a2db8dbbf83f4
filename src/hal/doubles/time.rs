use crate::hal::time::{self, Milliseconds};
use std::{cell::Cell, rc::Rc};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FakeInstant(pub u32);

/// Manually advanced clock. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct FakeClock {
    milliseconds: Rc<Cell<u32>>,
}

impl FakeClock {
    pub fn advance(&self, milliseconds: u32) {
        self.milliseconds.set(self.milliseconds.get().wrapping_add(milliseconds))
    }
}

impl time::Instant for FakeInstant {}

impl time::Now for FakeClock {
    type I = FakeInstant;
    fn now(&self) -> FakeInstant { FakeInstant(self.milliseconds.get()) }
}

impl core::ops::Sub for FakeInstant {
    type Output = Milliseconds;
    fn sub(self, rhs: Self) -> Self::Output { Milliseconds(self.0.wrapping_sub(rhs.0)) }
}

impl core::ops::Add<Milliseconds> for FakeInstant {
    type Output = Self;
    fn add(self, rhs: Milliseconds) -> Self { FakeInstant(self.0.wrapping_add(rhs.0)) }
}
