/// Hardware watchdog timer.
pub trait Watchdog {
    /// Restarts the countdown.
    fn kick(&mut self);
    /// Stops the watchdog, so it no longer resets the MCU.
    fn release(&mut self);
}
