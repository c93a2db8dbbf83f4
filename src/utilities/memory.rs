//! Utilities to manipulate generic memory
#![macro_use]

#[macro_export]
macro_rules! kb {
    ($val:expr) => {
        $val * 1024
    };
}

/// Generic address for the purpose of this module's methods.
/// Anything that can be offset by a usize and yield another
/// address works as an address.
pub trait Address: Copy + core::ops::Add<usize, Output = Self> {}
impl<A> Address for A where A: Copy + core::ops::Add<usize, Output = A> {}

#[cfg(test)]
mod test {
    #[test]
    fn conversion_macros() {
        assert_eq!(kb!(16), 0x4000);
        assert_eq!(kb!(1) / 2, 512);
    }
}
