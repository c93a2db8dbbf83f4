//! Convenience bitwise operations.

/// Simple check for particular bits being set or cleared.
pub trait BitFlags {
    fn is_set(&self, bit: u8) -> bool;
    fn is_clear(&self, bit: u8) -> bool;
}

/// Builds a value bit by bit.
pub trait BitBuild: Sized {
    fn with_bit(self, bit: u8, set: bool) -> Self;
}

/// Blanket implementation for any types convertible to u32.
impl<U: Copy + Into<u32>> BitFlags for U {
    fn is_set(&self, bit: u8) -> bool {
        assert!(bit < 32);
        ((*self).into() & (1u32 << bit)) != 0
    }

    fn is_clear(&self, bit: u8) -> bool { !self.is_set(bit) }
}

impl BitBuild for u8 {
    fn with_bit(self, bit: u8, set: bool) -> Self {
        assert!(bit < 8);
        if set { self | (1 << bit) } else { self & !(1 << bit) }
    }
}

impl BitBuild for u16 {
    fn with_bit(self, bit: u8, set: bool) -> Self {
        assert!(bit < 16);
        if set { self | (1 << bit) } else { self & !(1 << bit) }
    }
}
