#![cfg_attr(test, allow(unused_attributes))]
#![cfg_attr(all(not(test), target_arch = "arm"), no_std)]
#![cfg_attr(target_arch = "arm", no_main)]

#[cfg(target_arch = "arm")]
use defmt_rtt as _;

#[cfg(all(target_arch = "arm", feature = "psoc6_ubm"))]
#[cortex_m_rt::entry]
fn main() -> ! {
    use heapless::Vec;
    use ubm_lib::{
        devices::{backplane::MAX_HFC, config_store::ConfigStore, supervisor},
        error::{Error, ReportOnUnwrap},
        ports::{self, generated},
    };

    let core = cortex_m::Peripherals::take()
        .ok_or(Error::DeviceError("Core peripherals already taken"))
        .report_unwrap();

    // Safety: first and only handle.
    let mut watchdog = unsafe { ports::watchdog::Wdt::steal() };
    let mut flash = ports::flash::McuFlash::new().report_unwrap();
    let image_ok = ports::flash::Address(generated::IMAGE_OK_ADDRESS);
    let confirmation = supervisor::confirm_boot(&mut watchdog, &mut flash, image_ok).report_unwrap();
    defmt::info!("Boot confirmation: {:?}", confirmation);

    let expected = generated::PRIMARY_BOOT
        .application_address(generated::INTERNAL_FLASH_BASE, generated::EXTERNAL_FLASH_BASE)
        .report_unwrap();
    if core.SCB.vtor.read() != expected {
        defmt::warn!("Running outside of the primary image slot");
    }

    let clock = ports::clock::SysTick::new(core.SYST, ports::CORE_CLOCK_HZ);
    let factory = generated::factory_backplane().report_unwrap();
    let buses: Vec<_, MAX_HFC> = ports::buses(&factory).collect();
    let store = ConfigStore::from_geometry(flash, generated::STORE_GEOMETRY).report_unwrap();
    let signals = ports::signals().report_unwrap();
    let events = ports::events::take_consumer()
        .ok_or(Error::DeviceError("Event queue already split"))
        .report_unwrap();

    supervisor::Supervisor::new(signals, store, clock, buses, factory, events).report_unwrap().run()
}

#[cfg(not(all(target_arch = "arm", feature = "psoc6_ubm")))]
fn main() {}
