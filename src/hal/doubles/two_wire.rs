use super::error::FakeError;
use crate::{hal::two_wire::Target, utilities::iterator::CollectSlice};
use std::collections::VecDeque;

/// Bus double. Tests queue host writes in `incoming` and inspect
/// what the controller preloaded in `responses`.
#[derive(Debug, Default)]
pub struct FakeTwoWire {
    pub address: u8,
    pub incoming: VecDeque<Vec<u8>>,
    pub responses: Vec<Vec<u8>>,
    /// Number of upcoming `respond` calls that report the bus busy.
    pub busy_responses: usize,
    pub aborts: usize,
}

impl FakeTwoWire {
    pub fn new(address: u8) -> Self { Self { address, ..Default::default() } }

    pub fn host_writes(&mut self, frame: &[u8]) { self.incoming.push_back(frame.to_vec()) }

    pub fn last_response(&self) -> Option<&[u8]> { self.responses.last().map(Vec::as_slice) }
}

impl Target for FakeTwoWire {
    type Error = FakeError;

    fn receive(&mut self, buffer: &mut [u8]) -> nb::Result<usize, Self::Error> {
        let frame = self.incoming.pop_front().ok_or(nb::Error::WouldBlock)?;
        if frame.len() > buffer.len() {
            return Err(nb::Error::Other(FakeError));
        }
        Ok(frame.into_iter().collect_slice(buffer))
    }

    fn respond(&mut self, bytes: &[u8]) -> nb::Result<(), Self::Error> {
        if self.busy_responses > 0 {
            self.busy_responses -= 1;
            return Err(nb::Error::WouldBlock);
        }
        self.responses.push(bytes.to_vec());
        Ok(())
    }

    fn address(&self) -> u8 { self.address }

    fn abort(&mut self) { self.aborts += 1 }
}
