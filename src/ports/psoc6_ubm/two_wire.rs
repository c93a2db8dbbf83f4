//! Host buses. The board support package runs each SCB block in target
//! mode and hands completed host writes over through
//! `ubm_two_wire_write_complete`, called from its interrupt handler.
use super::{events, ffi};
use crate::{
    devices::{backplane::MAX_HFC, supervisor::IngressEvent},
    error::{self, Error as ControllerError},
    hal::two_wire::Target,
};
use core::cell::RefCell;
use cortex_m::interrupt::{self, Mutex};
use heapless::Vec;

/// Longest host write kept. Longer writes are truncated and then
/// rejected by the protocol engine as malformed.
const MAILBOX_SIZE: usize = 32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub enum Error {
    Overflow,
    RespondFailed(u32),
}

impl error::Convertible for Error {
    fn into(self) -> ControllerError {
        ControllerError::DriverError(match self {
            Error::Overflow => "[Two wire] Host write overflowed the receive buffer",
            Error::RespondFailed(_) => "[Two wire] Failed to load response",
        })
    }
}

#[derive(Default)]
struct Mailbox {
    frame: Vec<u8, MAILBOX_SIZE>,
    full: bool,
}

const UNCLAIMED: Option<Mailbox> = None;
static MAILBOXES: Mutex<RefCell<[Option<Mailbox>; MAX_HFC]>> = Mutex::new(RefCell::new([UNCLAIMED; MAX_HFC]));

pub struct TwoWire {
    hfc: u8,
    address: u8,
}

impl TwoWire {
    pub fn new(hfc: u8, address: u8) -> Self {
        interrupt::free(|cs| {
            if let Some(slot) = MAILBOXES.borrow(cs).borrow_mut().get_mut(hfc as usize) {
                *slot = Some(Mailbox::default());
            }
        });
        Self { hfc, address }
    }
}

impl Target for TwoWire {
    type Error = Error;

    fn receive(&mut self, buffer: &mut [u8]) -> nb::Result<usize, Error> {
        interrupt::free(|cs| {
            let mut mailboxes = MAILBOXES.borrow(cs).borrow_mut();
            let mailbox = mailboxes
                .get_mut(self.hfc as usize)
                .and_then(Option::as_mut)
                .ok_or(nb::Error::WouldBlock)?;
            if !mailbox.full {
                return Err(nb::Error::WouldBlock);
            }
            mailbox.full = false;
            let frame = &mailbox.frame;
            if frame.len() > buffer.len() {
                return Err(nb::Error::Other(Error::Overflow));
            }
            buffer[..frame.len()].copy_from_slice(frame);
            Ok(frame.len())
        })
    }

    fn respond(&mut self, bytes: &[u8]) -> nb::Result<(), Error> {
        // Safety: the library copies `bytes` before returning.
        let status = unsafe { ffi::ubm_bsp_two_wire_respond(self.hfc, bytes.as_ptr(), bytes.len() as u32) };
        match status {
            ffi::I2C_SUCCESS => Ok(()),
            ffi::I2C_BUSY => Err(nb::Error::WouldBlock),
            other => Err(nb::Error::Other(Error::RespondFailed(other))),
        }
    }

    fn address(&self) -> u8 { self.address }

    fn abort(&mut self) {
        // Safety: only resets the SCB block owned by this bus.
        unsafe { ffi::ubm_bsp_two_wire_abort(self.hfc) };
        interrupt::free(|cs| {
            if let Some(Some(mailbox)) = MAILBOXES.borrow(cs).borrow_mut().get_mut(self.hfc as usize) {
                mailbox.full = false;
                mailbox.frame.clear();
            }
        });
    }
}

/// Called by the board support package once a host write to `hfc`
/// completes.
///
/// # Safety
/// `data` must point to `length` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn ubm_two_wire_write_complete(hfc: u8, data: *const u8, length: u32) {
    let bytes = core::slice::from_raw_parts(data, length as usize);
    let stored = interrupt::free(|cs| {
        let mut mailboxes = MAILBOXES.borrow(cs).borrow_mut();
        match mailboxes.get_mut(hfc as usize).and_then(Option::as_mut) {
            Some(mailbox) => {
                let kept = bytes.len().min(MAILBOX_SIZE);
                mailbox.frame.clear();
                // Cannot fail, `kept` fits the mailbox.
                let _ = mailbox.frame.extend_from_slice(&bytes[..kept]);
                mailbox.full = true;
                true
            }
            None => false,
        }
    });
    if stored {
        events::post(IngressEvent::BusActivity(hfc));
    }
}
