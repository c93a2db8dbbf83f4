use crate::hal::gpio::{InputPin, OutputPin};
use std::{cell::RefCell, rc::Rc};

/// Pin double. Clones share the same line, so a test can keep a
/// handle to a pin it moved into a driver.
#[derive(Clone, Debug, Default)]
pub struct MockPin {
    line: Rc<RefCell<Line>>,
}

#[derive(Debug, Default)]
struct Line {
    high: bool,
    changes: Vec<bool>,
}

impl MockPin {
    pub fn high() -> Self {
        let pin = Self::default();
        pin.line.borrow_mut().high = true;
        pin
    }

    pub fn low() -> Self { Self::default() }

    /// Externally drives the line, as a connected device would.
    pub fn drive(&self, high: bool) { self.line.borrow_mut().high = high }

    /// Every level written through `OutputPin`, in order.
    pub fn changes(&self) -> Vec<bool> { self.line.borrow().changes.clone() }
}

impl OutputPin for MockPin {
    fn set_low(&mut self) {
        let mut line = self.line.borrow_mut();
        line.high = false;
        line.changes.push(false);
    }

    fn set_high(&mut self) {
        let mut line = self.line.borrow_mut();
        line.high = true;
        line.changes.push(true);
    }
}

impl InputPin for MockPin {
    fn is_high(&self) -> bool { self.line.borrow().high }
}
