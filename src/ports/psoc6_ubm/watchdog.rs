use super::ffi;
use crate::hal::watchdog::Watchdog;

/// Free running watchdog, armed by the bootloader before hand-off.
pub struct Wdt {
    _private: (),
}

impl Wdt {
    /// # Safety
    /// Only one handle to the watchdog may exist.
    pub unsafe fn steal() -> Self { Self { _private: () } }
}

impl Watchdog for Wdt {
    fn kick(&mut self) {
        // Safety: the handle is unique, see `steal`.
        unsafe { ffi::Cy_WDT_ClearWatchdog() }
    }

    fn release(&mut self) {
        // Safety: as above.
        unsafe {
            ffi::Cy_WDT_Unlock();
            ffi::Cy_WDT_Disable();
        }
    }
}
