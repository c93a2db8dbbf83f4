use crate::hal::watchdog::Watchdog;

#[derive(Debug, Default)]
pub struct FakeWatchdog {
    pub kicks: usize,
    pub released: bool,
}

impl Watchdog for FakeWatchdog {
    fn kick(&mut self) { self.kicks += 1 }
    fn release(&mut self) { self.released = true }
}
