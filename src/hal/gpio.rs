//! # Simple GPIO interface
//!
//! Separate interfaces to Input and Output pins. Levels are electrical;
//! the active level of each backplane signal is decided by whoever owns
//! the pin (see `devices::signals`).

/// Interface to a writable pin.
pub trait OutputPin {
    fn set_low(&mut self);
    fn set_high(&mut self);

    fn set_level(&mut self, high: bool) {
        if high {
            self.set_high()
        } else {
            self.set_low()
        }
    }
}

/// Interface to a readable pin.
pub trait InputPin {
    fn is_high(&self) -> bool;
    fn is_low(&self) -> bool { !self.is_high() }
}
